//! Memory guard for the long-running sampling loop

use crate::config::GuardConfig;
use crate::memory::MemorySnapshot;
use crate::model::TimestampMs;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    Normal,
    Warned,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    MemoryWarning,
    MemoryCritical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub message: String,
    pub timestamp_ms: TimestampMs,
}

/// What the monitor must do after a memory reading.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardVerdict {
    pub state: GuardState,
    /// Trim the sample store with aggressive retention.
    pub trim: bool,
    pub alert: Option<AlertEvent>,
    /// Change since the previous reading.
    pub delta_bytes: i64,
}

pub struct ResourceGuard {
    warning_bytes: u64,
    critical_bytes: u64,
    cooldown: Duration,
    state: GuardState,
    last_critical_alert: Option<Instant>,
    previous: Option<MemorySnapshot>,
    current: Option<MemorySnapshot>,
}

impl ResourceGuard {
    pub fn new(config: &GuardConfig) -> Self {
        let warning_bytes = config.warning_mb.saturating_mul(MB);
        Self {
            warning_bytes,
            critical_bytes: config.critical_mb.saturating_mul(MB).max(warning_bytes),
            cooldown: Duration::from_secs(config.cooldown_secs),
            state: GuardState::Normal,
            last_critical_alert: None,
            previous: None,
            current: None,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn last_snapshot(&self) -> Option<MemorySnapshot> {
        self.current
    }

    pub fn check(&mut self, snapshot: MemorySnapshot) -> GuardVerdict {
        self.check_at(snapshot, Instant::now())
    }

    /// Classify a reading. The state follows the latest reading alone; only
    /// the critical alert is rate-limited by the cooldown.
    pub fn check_at(&mut self, snapshot: MemorySnapshot, now: Instant) -> GuardVerdict {
        self.previous = self.current.replace(snapshot);
        let delta_bytes = self
            .previous
            .map(|p| snapshot.rss_bytes as i64 - p.rss_bytes as i64)
            .unwrap_or(0);

        let next = if snapshot.rss_bytes >= self.critical_bytes {
            GuardState::Critical
        } else if snapshot.rss_bytes >= self.warning_bytes {
            GuardState::Warned
        } else {
            GuardState::Normal
        };
        let prior = std::mem::replace(&mut self.state, next);
        let mb = snapshot.rss_mb();

        let alert = match next {
            GuardState::Critical => {
                let cooled = self
                    .last_critical_alert
                    .map_or(true, |at| now.saturating_duration_since(at) >= self.cooldown);
                if cooled {
                    self.last_critical_alert = Some(now);
                    error!("Memory critical: {:.1} MB, trimming sample history", mb);
                    Some(AlertEvent {
                        kind: AlertKind::MemoryCritical,
                        message: format!(
                            "memory usage {:.1} MB exceeds critical threshold {} MB; sample history trimmed",
                            mb,
                            self.critical_bytes / MB
                        ),
                        timestamp_ms: snapshot.timestamp_ms,
                    })
                } else {
                    debug!("Memory still critical ({:.1} MB), alert suppressed", mb);
                    None
                }
            }
            GuardState::Warned if prior == GuardState::Normal => {
                warn!("Memory warning: {:.1} MB", mb);
                Some(AlertEvent {
                    kind: AlertKind::MemoryWarning,
                    message: format!(
                        "memory usage {:.1} MB exceeds warning threshold {} MB",
                        mb,
                        self.warning_bytes / MB
                    ),
                    timestamp_ms: snapshot.timestamp_ms,
                })
            }
            GuardState::Warned => None,
            GuardState::Normal => {
                if prior != GuardState::Normal {
                    info!("Memory back to normal: {:.1} MB", mb);
                }
                None
            }
        };

        GuardVerdict {
            state: next,
            trim: next == GuardState::Critical,
            alert,
            delta_bytes,
        }
    }
}
