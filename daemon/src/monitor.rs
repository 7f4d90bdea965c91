//! Background monitoring scheduler
//!
//! One task owns the sampling loop. Each cycle pulls a scan, feeds the
//! sample store, updates predictors, scores channels, checks memory and
//! publishes a [`Snapshot`] on a broadcast channel. Subscribers that fall
//! behind lose events but never see them out of order.

use crate::config::{Config, GeneralConfig, StoreConfig};
use crate::error::MonitorError;
use crate::guard::{AlertEvent, GuardState, ResourceGuard};
use crate::interference::{self, ChannelUsage, InterferenceScore};
use crate::memory::{MemoryProbe, MemorySnapshot};
use crate::model::{now_ms, Band, NetworkId, Sample, TimestampMs};
use crate::predictor::{Forecast, TrendPredictor};
use crate::quality::{self, QualityGrade};
use crate::scanner::{ScanRecord, ScanSource};
use crate::store::SampleStore;
use crate::vendor::{VendorMatch, VendorResolver};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Stopped,
    Running,
    Stopping,
}

impl MonitorStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MonitorStatus::Running,
            2 => MonitorStatus::Stopping,
            _ => MonitorStatus::Stopped,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MonitorStatus::Stopped => 0,
            MonitorStatus::Running => 1,
            MonitorStatus::Stopping => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkReport {
    pub network: NetworkId,
    pub vendor: VendorMatch,
    pub timestamp_ms: TimestampMs,
    pub rssi_dbm: i32,
    pub channel: u8,
    pub band: Band,
    pub bandwidth_mhz: u16,
    pub grade: QualityGrade,
    pub forecast: Forecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandRecommendation {
    pub band: Band,
    pub channel: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatus {
    pub rss_bytes: Option<u64>,
    pub state: GuardState,
    pub delta_bytes: i64,
    pub stored_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub sequence: u64,
    pub timestamp_ms: TimestampMs,
    /// The scan failed or timed out; readings come from stored history.
    pub scan_skipped: bool,
    pub networks: Vec<NetworkReport>,
    pub channels: Vec<InterferenceScore>,
    pub recommended: Vec<BandRecommendation>,
    pub memory: MemoryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    Snapshot(Snapshot),
    Alert(AlertEvent),
}

/// State shared between the controlling side and the loop.
struct Shared {
    general: GeneralConfig,
    store_config: StoreConfig,
    store: Arc<SampleStore>,
    vendors: Arc<VendorResolver>,
    scanner: Arc<dyn ScanSource>,
    probe: Arc<dyn MemoryProbe>,
    events: broadcast::Sender<MonitorEvent>,
    status: AtomicU8,
    stop_requested: AtomicBool,
    latest: Mutex<Option<Snapshot>>,
}

impl Shared {
    fn set_status(&self, status: MonitorStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Sleep until `deadline`, waking every poll interval to look for a
    /// stop request. Returns false if asked to stop.
    async fn sleep_until(&self, deadline: Instant) -> bool {
        let poll = self.general.cancel_poll();
        loop {
            if self.should_stop() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(poll)).await;
        }
    }

    async fn stop_signal(&self) {
        let poll = self.general.cancel_poll();
        while !self.should_stop() {
            tokio::time::sleep(poll).await;
        }
    }

    fn publish(&self, event: MonitorEvent) {
        // No subscribers is fine; the latest snapshot is still retained.
        let _ = self.events.send(event);
    }
}

/// State owned by the loop task and handed back when it stops.
struct Engine {
    predictor: TrendPredictor,
    guard: ResourceGuard,
    sequence: u64,
}

enum CycleOutcome {
    Published,
    Aborted,
}

pub struct Monitor {
    shared: Arc<Shared>,
    engine: Mutex<Option<Engine>>,
    task: Mutex<Option<JoinHandle<Engine>>>,
    config: Config,
}

impl Monitor {
    pub fn new(
        config: Config,
        scanner: Arc<dyn ScanSource>,
        probe: Arc<dyn MemoryProbe>,
        vendors: Arc<VendorResolver>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.general.event_capacity.max(1));
        let shared = Arc::new(Shared {
            general: config.general.clone(),
            store_config: config.store.clone(),
            store: Arc::new(SampleStore::new()),
            vendors,
            scanner,
            probe,
            events,
            status: AtomicU8::new(MonitorStatus::Stopped.as_u8()),
            stop_requested: AtomicBool::new(false),
            latest: Mutex::new(None),
        });
        Self {
            engine: Mutex::new(Some(Self::fresh_engine(&config))),
            shared,
            task: Mutex::new(None),
            config,
        }
    }

    fn fresh_engine(config: &Config) -> Engine {
        Engine {
            predictor: TrendPredictor::new(config.predictor.clone()),
            guard: ResourceGuard::new(&config.guard),
            sequence: 0,
        }
    }

    /// Begin sampling every `interval`. Must be called inside a Tokio runtime.
    pub fn start(&self, interval: Duration) -> Result<(), MonitorError> {
        // Held until the handle is stored so `stop` never sees Running
        // without a task to join.
        let mut task = self.task.lock();
        self.shared
            .status
            .compare_exchange(
                MonitorStatus::Stopped.as_u8(),
                MonitorStatus::Running.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| MonitorError::AlreadyRunning)?;

        let engine = self
            .engine
            .lock()
            .take()
            .unwrap_or_else(|| Self::fresh_engine(&self.config));
        self.shared.stop_requested.store(false, Ordering::SeqCst);

        let interval = interval.max(Duration::from_millis(1));
        info!("Monitor starting, interval {:?}", interval);
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(run_loop(shared, engine, interval)));
        Ok(())
    }

    /// Request the loop to stop and wait for it. A cycle in progress runs
    /// to completion unless it is still waiting on the scan or on vendor
    /// lookups.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let handle = {
            let mut task = self.task.lock();
            if self.status() == MonitorStatus::Stopped {
                return Err(MonitorError::NotRunning);
            }
            self.shared.set_status(MonitorStatus::Stopping);
            self.shared.stop_requested.store(true, Ordering::SeqCst);
            task.take()
        };
        if let Some(handle) = handle {
            let engine = match handle.await {
                Ok(engine) => engine,
                Err(e) => {
                    error!("Monitor task ended abnormally: {}", e);
                    Self::fresh_engine(&self.config)
                }
            };
            *self.engine.lock() = Some(engine);
            self.shared.set_status(MonitorStatus::Stopped);
            info!("Monitor stopped");
        }
        Ok(())
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus::from_u8(self.shared.status.load(Ordering::SeqCst))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.shared.events.subscribe()
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.shared.latest.lock().clone()
    }

    pub fn store(&self) -> Arc<SampleStore> {
        Arc::clone(&self.shared.store)
    }

    pub fn vendors(&self) -> Arc<VendorResolver> {
        Arc::clone(&self.shared.vendors)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

async fn run_loop(shared: Arc<Shared>, mut engine: Engine, interval: Duration) -> Engine {
    loop {
        if shared.should_stop() {
            break;
        }
        let started = Instant::now();
        match engine.cycle(&shared).await {
            CycleOutcome::Published => {}
            CycleOutcome::Aborted => break,
        }
        if !shared.sleep_until(started + interval).await {
            break;
        }
    }
    // `stop` flips the status to Stopped once the engine is back in place.
    engine
}

impl Engine {
    async fn cycle(&mut self, shared: &Shared) -> CycleOutcome {
        let timeout = shared.general.scan_timeout();
        let scan = tokio::time::timeout(timeout, shared.scanner.scan());
        let records = tokio::select! {
            result = scan => match result {
                Ok(Ok(records)) => Some(records),
                Ok(Err(e)) => {
                    warn!("Scan failed, skipping cycle input: {}", e);
                    None
                }
                Err(_) => {
                    warn!("{}", MonitorError::ScanTimeout(timeout));
                    None
                }
            },
            _ = shared.stop_signal() => return CycleOutcome::Aborted,
        };
        let scan_skipped = records.is_none();
        let now = now_ms();

        let fresh = ingest(&shared.store, records.unwrap_or_default(), now);
        shared.store.trim_at(shared.store_config.retention(), now);
        self.forget_inactive(&shared.store);

        if shared.should_stop() {
            return CycleOutcome::Aborted;
        }

        for sample in &fresh {
            self.predictor.update(sample);
        }

        let freshness = Duration::from_secs(shared.store_config.usage_freshness_secs);
        let cutoff = now.saturating_sub(freshness.as_millis() as u64);
        let current: Vec<Sample> = shared
            .store
            .latest()
            .into_iter()
            .filter(|s| s.timestamp_ms() >= cutoff)
            .collect();

        // Remote vendor lookups can be slow; a stop request wins over them.
        let networks = tokio::select! {
            networks = self.reports(shared, &current) => networks,
            _ = shared.stop_signal() => return CycleOutcome::Aborted,
        };

        let (channels, recommended) = score_bands(&current);
        let memory = self.check_memory(shared, now);

        self.sequence += 1;
        let snapshot = Snapshot {
            sequence: self.sequence,
            timestamp_ms: now,
            scan_skipped,
            networks,
            channels,
            recommended,
            memory,
        };
        debug!(
            "Cycle {}: {} networks, {} samples stored",
            snapshot.sequence,
            snapshot.networks.len(),
            snapshot.memory.stored_samples
        );
        *shared.latest.lock() = Some(snapshot.clone());
        shared.publish(MonitorEvent::Snapshot(snapshot));
        CycleOutcome::Published
    }

    async fn reports(&self, shared: &Shared, current: &[Sample]) -> Vec<NetworkReport> {
        let mut networks = Vec::with_capacity(current.len());
        for sample in current {
            let vendor = shared.vendors.resolve(sample.network().bssid.oui()).await;
            networks.push(self.report(sample, vendor, shared.general.forecast_horizon_secs));
        }
        networks
    }

    fn report(&self, sample: &Sample, vendor: VendorMatch, horizon_secs: u64) -> NetworkReport {
        NetworkReport {
            network: sample.network().clone(),
            vendor,
            timestamp_ms: sample.timestamp_ms(),
            rssi_dbm: sample.rssi_dbm(),
            channel: sample.channel(),
            band: sample.band(),
            bandwidth_mhz: sample.bandwidth_mhz(),
            grade: quality::grade(sample.rssi_dbm()),
            forecast: self
                .predictor
                .forecast(sample.network(), Duration::from_secs(horizon_secs)),
        }
    }

    fn forget_inactive(&mut self, store: &SampleStore) {
        let active: HashSet<NetworkId> = store.networks().into_iter().collect();
        let dropped = self.predictor.retain_active(&active);
        if dropped > 0 {
            debug!("Dropped {} predictor states for departed networks", dropped);
        }
    }

    fn check_memory(&mut self, shared: &Shared, now: TimestampMs) -> MemoryStatus {
        let Some(rss_bytes) = shared.probe.rss_bytes() else {
            debug!("Process memory unavailable this cycle");
            return MemoryStatus {
                rss_bytes: None,
                state: self.guard.state(),
                delta_bytes: 0,
                stored_samples: shared.store.len(),
            };
        };

        let verdict = self.guard.check(MemorySnapshot {
            rss_bytes,
            timestamp_ms: now,
        });
        if verdict.trim {
            let report = shared.store.trim_at(shared.store_config.aggressive_retention(), now);
            self.forget_inactive(&shared.store);
            info!(
                "Aggressive trim removed {} samples, {} networks",
                report.samples_removed, report.networks_dropped
            );
        }
        if let Some(alert) = verdict.alert {
            shared.publish(MonitorEvent::Alert(alert));
        }
        MemoryStatus {
            rss_bytes: Some(rss_bytes),
            state: verdict.state,
            delta_bytes: verdict.delta_bytes,
            stored_samples: shared.store.len(),
        }
    }
}

/// Validate and store scan records; invalid ones are logged and skipped.
fn ingest(store: &SampleStore, records: Vec<ScanRecord>, now: TimestampMs) -> Vec<Sample> {
    let mut fresh = Vec::with_capacity(records.len());
    for record in records {
        match record.to_sample(now) {
            Ok(sample) => {
                store.append(sample.clone());
                fresh.push(sample);
            }
            Err(e) => warn!("Dropping scan record: {}", e),
        }
    }
    fresh
}

fn score_bands(current: &[Sample]) -> (Vec<InterferenceScore>, Vec<BandRecommendation>) {
    let mut channels = Vec::new();
    let mut recommended = Vec::new();
    for band in Band::ALL {
        if !current.iter().any(|s| s.band() == band) {
            continue;
        }
        let usage = ChannelUsage::from_samples(current, band);
        let scores = interference::score_band(&usage, band);
        if let Some(best) = scores.iter().find(|s| s.recommended) {
            recommended.push(BandRecommendation {
                band,
                channel: best.channel,
            });
        }
        channels.extend(scores);
    }
    (channels, recommended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MacAddress;

    fn sample(n: u8, rssi: i32, channel: u8, band: Band) -> Sample {
        let id = NetworkId::new(format!("n{n}"), MacAddress([0x02, 0, 0, 0, 0, n]));
        Sample::new(id, 1, rssi, channel, band, 20).unwrap()
    }

    #[test]
    fn status_round_trips_through_atomic_encoding() {
        for status in [MonitorStatus::Stopped, MonitorStatus::Running, MonitorStatus::Stopping] {
            assert_eq!(MonitorStatus::from_u8(status.as_u8()), status);
        }
    }

    #[test]
    fn only_observed_bands_are_scored() {
        let current = vec![
            sample(1, -50, 6, Band::Band2_4GHz),
            sample(2, -50, 6, Band::Band2_4GHz),
            sample(3, -50, 11, Band::Band2_4GHz),
        ];
        let (channels, recommended) = score_bands(&current);
        assert!(channels.iter().all(|c| c.band == Band::Band2_4GHz));
        assert_eq!(channels.len(), 13);
        let six = channels.iter().find(|c| c.channel == 6).unwrap().score;
        let eleven = channels.iter().find(|c| c.channel == 11).unwrap().score;
        assert!(eleven > six);
        assert_eq!(recommended.len(), 1);
        assert_eq!(recommended[0].band, Band::Band2_4GHz);
    }

    #[test]
    fn ingest_skips_invalid_records() {
        let store = SampleStore::new();
        let records = vec![
            ScanRecord {
                ssid: "ok".into(),
                bssid: "00:11:22:33:44:55".into(),
                rssi_dbm: -60,
                channel: 1,
                band: None,
                bandwidth_mhz: 20,
            },
            ScanRecord {
                ssid: "loud".into(),
                bssid: "00:11:22:33:44:66".into(),
                rssi_dbm: 12,
                channel: 1,
                band: None,
                bandwidth_mhz: 20,
            },
        ];
        let fresh = ingest(&store, records, 1_000);
        assert_eq!(fresh.len(), 1);
        assert_eq!(store.len(), 1);
    }
}
