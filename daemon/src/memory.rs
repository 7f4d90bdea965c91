//! Process memory sampling (reads /proc on Linux)

mod linux;

pub use linux::ProcMemoryProbe;

use crate::model::TimestampMs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub rss_bytes: u64,
    pub timestamp_ms: TimestampMs,
}

impl MemorySnapshot {
    pub fn rss_mb(&self) -> f64 {
        self.rss_bytes as f64 / (1024.0 * 1024.0)
    }
}

pub trait MemoryProbe: Send + Sync {
    /// Resident set size of this process, or `None` when it cannot be read.
    fn rss_bytes(&self) -> Option<u64>;
}
