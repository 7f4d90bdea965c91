//! Channel interference scoring
//!
//! Scores are heuristics over scan metadata (RSSI, channel, bandwidth), not
//! spectrum measurements. A channel starts at 100 and loses points for every
//! network sharing it or overlapping it.

use crate::model::{Band, Sample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CO_CHANNEL_PENALTY: f64 = 30.0;
const ADJACENT_PENALTY_2_4: f64 = 20.0;
const ADJACENT_REACH_2_4: i32 = 4;
const ADJACENT_FALLOFF_2_4: f64 = 5.0;
const PLAN_EDGE_PENALTY: f64 = 5.0;
const PLAN_EDGE_OFFSET: i32 = 4;

/// Occupancy of a single channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelLoad {
    pub weight: f64,
    pub bandwidth_mhz: u16,
    pub count: u32,
}

/// Per-channel occupancy for one band, rebuilt every scoring cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelUsage {
    channels: BTreeMap<u8, ChannelLoad>,
}

impl ChannelUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupancy weight contributed by one network: 1.0 at -50 dBm or
    /// stronger, falling linearly to 0.0 at -100 dBm.
    pub fn weight_for_rssi(rssi_dbm: i32) -> f64 {
        ((rssi_dbm as f64 + 100.0) / 50.0).clamp(0.0, 1.0)
    }

    /// Build usage for `band` from one sample per network.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>, band: Band) -> Self {
        let mut usage = Self::new();
        for sample in samples.into_iter().filter(|s| s.band() == band) {
            usage.add(sample.channel(), Self::weight_for_rssi(sample.rssi_dbm()), sample.bandwidth_mhz());
        }
        usage
    }

    pub fn add(&mut self, channel: u8, weight: f64, bandwidth_mhz: u16) {
        let load = self.channels.entry(channel).or_default();
        load.weight += weight.max(0.0);
        load.bandwidth_mhz = load.bandwidth_mhz.max(bandwidth_mhz);
        load.count += 1;
    }

    pub fn get(&self, channel: u8) -> Option<&ChannelLoad> {
        self.channels.get(&channel)
    }

    fn weight(&self, channel: i32) -> f64 {
        u8::try_from(channel)
            .ok()
            .and_then(|c| self.channels.get(&c))
            .map(|l| l.weight)
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &ChannelLoad)> {
        self.channels.iter().map(|(c, l)| (*c, l))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterferenceScore {
    pub channel: u8,
    pub band: Band,
    pub score: f64,
    pub recommended: bool,
    /// Advisory only: DFS channels are not penalised.
    pub dfs: bool,
}

/// Score one channel in 0..=100. Higher is cleaner.
pub fn score(channel: u8, usage: &ChannelUsage, band: Band) -> f64 {
    let target = channel as i32;
    let mut score = 100.0 - usage.weight(target) * CO_CHANNEL_PENALTY;

    match band {
        Band::Band2_4GHz => {
            // 22 MHz wide channels spill over up to four neighbours on each side.
            for offset in (-ADJACENT_REACH_2_4..=ADJACENT_REACH_2_4).filter(|o| *o != 0) {
                let weight = usage.weight(target + offset);
                if weight > 0.0 {
                    let falloff = (1.0 - offset.abs() as f64 / ADJACENT_FALLOFF_2_4).max(0.0);
                    score -= weight * falloff * ADJACENT_PENALTY_2_4;
                }
            }
        }
        Band::Band5GHz | Band::Band6GHz => {
            for offset in [-PLAN_EDGE_OFFSET, PLAN_EDGE_OFFSET] {
                score -= usage.weight(target + offset) * PLAN_EDGE_PENALTY;
            }
        }
    }

    score.clamp(0.0, 100.0)
}

/// Score every channel of the band's plan and flag the recommended one:
/// the highest score, lower channel number on exact ties.
pub fn score_band(usage: &ChannelUsage, band: Band) -> Vec<InterferenceScore> {
    let mut scores: Vec<InterferenceScore> = band
        .channel_plan()
        .into_iter()
        .map(|channel| InterferenceScore {
            channel,
            band,
            score: score(channel, usage, band),
            recommended: false,
            dfs: band.is_dfs(channel),
        })
        .collect();

    if let Some(best) = best_index(&scores) {
        scores[best].recommended = true;
    }
    scores
}

/// Channel recommended for `band`, if the plan is non-empty.
pub fn recommend(usage: &ChannelUsage, band: Band) -> Option<u8> {
    score_band(usage, band)
        .into_iter()
        .find(|s| s.recommended)
        .map(|s| s.channel)
}

fn best_index(scores: &[InterferenceScore]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, candidate) in scores.iter().enumerate() {
        match best {
            None => best = Some(idx),
            Some(b) => {
                let current = &scores[b];
                if candidate.score > current.score
                    || (candidate.score == current.score && candidate.channel < current.channel)
                {
                    best = Some(idx);
                }
            }
        }
    }
    best
}
