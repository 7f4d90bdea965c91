//! Bounded, time-windowed sample history per network

use crate::model::{now_ms, NetworkId, Sample, TimestampMs};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Retention bounds applied by [`SampleStore::trim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub max_age: Duration,
    pub max_count: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrimReport {
    pub samples_removed: usize,
    pub networks_dropped: usize,
}

/// Shared history of signal samples. Every series is kept sorted by
/// timestamp with at most one sample per timestamp.
///
/// A single lock guards the whole store: there is one writer per monitoring
/// cycle and readers are occasional.
#[derive(Default)]
pub struct SampleStore {
    series: Mutex<HashMap<NetworkId, VecDeque<Sample>>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in timestamp order. Appending past the newest sample is O(1);
    /// out-of-order samples are placed by binary search. A sample whose
    /// timestamp already exists replaces the stored one.
    pub fn append(&self, sample: Sample) {
        let mut series = self.series.lock();
        let entries = series.entry(sample.network().clone()).or_default();
        let ts = sample.timestamp_ms();

        match entries.back().map(Sample::timestamp_ms) {
            None => entries.push_back(sample),
            Some(last) if last < ts => entries.push_back(sample),
            Some(last) if last == ts => {
                if let Some(slot) = entries.back_mut() {
                    *slot = sample;
                }
            }
            Some(_) => match entries.binary_search_by_key(&ts, Sample::timestamp_ms) {
                Ok(idx) => entries[idx] = sample,
                Err(idx) => entries.insert(idx, sample),
            },
        }
    }

    /// Samples of `network` within the trailing `duration`, oldest first.
    /// Unknown networks yield an empty vector.
    pub fn window(&self, network: &NetworkId, duration: Duration) -> Vec<Sample> {
        self.window_at(network, duration, now_ms())
    }

    pub fn window_at(&self, network: &NetworkId, duration: Duration, now: TimestampMs) -> Vec<Sample> {
        let cutoff = now.saturating_sub(duration.as_millis() as u64);
        let series = self.series.lock();
        match series.get(network) {
            Some(entries) => {
                let start = entries.partition_point(|s| s.timestamp_ms() < cutoff);
                entries.range(start..).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Evict samples older than `max_age` and keep at most `max_count` of the
    /// newest per network. Series left empty are dropped entirely.
    pub fn trim(&self, retention: Retention) -> TrimReport {
        self.trim_at(retention, now_ms())
    }

    pub fn trim_at(&self, retention: Retention, now: TimestampMs) -> TrimReport {
        let cutoff = now.saturating_sub(retention.max_age.as_millis() as u64);
        let mut report = TrimReport::default();
        let mut series = self.series.lock();

        series.retain(|_, entries| {
            let before = entries.len();
            let stale = entries.partition_point(|s| s.timestamp_ms() < cutoff);
            entries.drain(..stale);
            if entries.len() > retention.max_count {
                let excess = entries.len() - retention.max_count;
                entries.drain(..excess);
            }
            report.samples_removed += before - entries.len();
            if entries.is_empty() {
                report.networks_dropped += 1;
                false
            } else {
                true
            }
        });
        report
    }

    /// Most recent sample of every network that has one.
    pub fn latest(&self) -> Vec<Sample> {
        let series = self.series.lock();
        let mut latest: Vec<Sample> = series.values().filter_map(|s| s.back().cloned()).collect();
        latest.sort_by(|a, b| a.network().cmp(b.network()));
        latest
    }

    pub fn networks(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self.series.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, network: &NetworkId) -> bool {
        self.series.lock().contains_key(network)
    }

    /// Total samples held across all series.
    pub fn len(&self) -> usize {
        self.series.lock().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
