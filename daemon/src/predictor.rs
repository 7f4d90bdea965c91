//! Streaming RSSI trend prediction (Holt's linear trend smoothing)

use crate::config::PredictorConfig;
use crate::model::{NetworkId, Sample, TimestampMs, RSSI_CEILING_DBM, RSSI_FLOOR_DBM};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// z-score of a two-sided 95% interval.
const Z_95: f64 = 1.96;
/// Smoothing applied to the observed spacing between samples.
const STEP_SMOOTHING: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorState {
    pub level: f64,
    pub trend: f64,
    pub last_timestamp_ms: TimestampMs,
    pub sample_count: u64,
    pub residual_variance: f64,
    /// Smoothed spacing between consecutive samples.
    pub step_ms: f64,
}

impl PredictorState {
    fn seed(sample: &Sample) -> Self {
        Self {
            level: sample.rssi_dbm() as f64,
            trend: 0.0,
            last_timestamp_ms: sample.timestamp_ms(),
            sample_count: 1,
            residual_variance: 0.0,
            step_ms: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Forecast {
    /// Fewer samples than the model needs; not an error.
    NotReady { samples: u64, required: u64 },
    Ready {
        value: f64,
        lower: f64,
        upper: f64,
        direction: TrendDirection,
    },
}

impl Forecast {
    pub fn is_ready(&self) -> bool {
        matches!(self, Forecast::Ready { .. })
    }
}

/// One smoothing model per network. Owned by the monitoring task, so it
/// carries no locking.
pub struct TrendPredictor {
    config: PredictorConfig,
    states: HashMap<NetworkId, PredictorState>,
}

impl TrendPredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// Feed one sample. Samples not newer than the last one seen for the
    /// network are ignored; returns whether the model advanced.
    pub fn update(&mut self, sample: &Sample) -> bool {
        let Some(state) = self.states.get_mut(sample.network()) else {
            self.states.insert(sample.network().clone(), PredictorState::seed(sample));
            return true;
        };
        if sample.timestamp_ms() <= state.last_timestamp_ms {
            return false;
        }

        let (alpha, beta, gamma) = (self.config.alpha, self.config.beta, self.config.gamma);
        let actual = sample.rssi_dbm() as f64;
        let predicted = state.level + state.trend;
        let residual = actual - predicted;
        state.residual_variance = gamma * residual * residual + (1.0 - gamma) * state.residual_variance;

        let level = alpha * actual + (1.0 - alpha) * predicted;
        state.trend = beta * (level - state.level) + (1.0 - beta) * state.trend;
        state.level = level;

        let dt = (sample.timestamp_ms() - state.last_timestamp_ms) as f64;
        state.step_ms = if state.sample_count == 1 {
            dt
        } else {
            STEP_SMOOTHING * dt + (1.0 - STEP_SMOOTHING) * state.step_ms
        };
        state.last_timestamp_ms = sample.timestamp_ms();
        state.sample_count += 1;
        true
    }

    /// Forecast `horizon` ahead. The horizon is converted to sample steps
    /// using the smoothed sampling interval; the 95% interval widens with
    /// the square root of the step count.
    pub fn forecast(&self, network: &NetworkId, horizon: Duration) -> Forecast {
        let required = self.config.min_samples.max(2);
        let state = match self.states.get(network) {
            Some(state) if state.sample_count >= required => state,
            Some(state) => {
                return Forecast::NotReady {
                    samples: state.sample_count,
                    required,
                }
            }
            None => return Forecast::NotReady { samples: 0, required },
        };

        let steps = if state.step_ms > 0.0 {
            horizon.as_millis() as f64 / state.step_ms
        } else {
            1.0
        };
        let value = state.level + state.trend * steps;
        let half_width = Z_95 * state.residual_variance.sqrt() * steps.max(1.0).sqrt();
        let (floor, ceiling) = (RSSI_FLOOR_DBM as f64, RSSI_CEILING_DBM as f64);

        Forecast::Ready {
            value: value.clamp(floor, ceiling),
            lower: (value - half_width).clamp(floor, ceiling),
            upper: (value + half_width).clamp(floor, ceiling),
            direction: self.classify(state.trend),
        }
    }

    pub fn direction(&self, network: &NetworkId) -> Option<TrendDirection> {
        self.states.get(network).map(|s| self.classify(s.trend))
    }

    fn classify(&self, trend: f64) -> TrendDirection {
        if trend.abs() < self.config.deadband_dbm {
            TrendDirection::Stable
        } else if trend > 0.0 {
            TrendDirection::Improving
        } else {
            TrendDirection::Degrading
        }
    }

    pub fn state(&self, network: &NetworkId) -> Option<&PredictorState> {
        self.states.get(network)
    }

    /// Drop models for networks no longer in the active window.
    pub fn retain_active(&mut self, active: &HashSet<NetworkId>) -> usize {
        let before = self.states.len();
        self.states.retain(|id, _| active.contains(id));
        before - self.states.len()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
