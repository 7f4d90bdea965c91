//! Scan sources: where the monitor gets the list of visible networks

use crate::error::{MonitorError, ScanError};
use crate::model::{Band, MacAddress, NetworkId, Sample, TimestampMs};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One visible network as reported by the platform scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(default)]
    pub ssid: String,
    /// Hardware address of the access point; validated when converted.
    pub bssid: String,
    pub rssi_dbm: i32,
    pub channel: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
    #[serde(default = "default_bandwidth")]
    pub bandwidth_mhz: u16,
}

fn default_bandwidth() -> u16 {
    20
}

impl ScanRecord {
    /// Band reported by the scanner, or inferred from the channel number.
    pub fn band(&self) -> Band {
        self.band.unwrap_or(match self.channel {
            1..=14 => Band::Band2_4GHz,
            32..=177 => Band::Band5GHz,
            _ => Band::Band6GHz,
        })
    }

    pub fn address(&self) -> Result<MacAddress, MonitorError> {
        MacAddress::parse(&self.bssid).map_err(|e| MonitorError::InvalidSample {
            network: self.ssid.clone(),
            reason: e.to_string(),
        })
    }

    pub fn to_sample(&self, timestamp_ms: TimestampMs) -> Result<Sample, MonitorError> {
        let network = NetworkId::new(self.ssid.clone(), self.address()?);
        Sample::new(
            network,
            timestamp_ms,
            self.rssi_dbm,
            self.channel,
            self.band(),
            self.bandwidth_mhz,
        )
    }
}

#[async_trait]
pub trait ScanSource: Send + Sync {
    /// Return every currently visible network. May be slow; the monitor
    /// bounds the wait.
    async fn scan(&self) -> Result<Vec<ScanRecord>, ScanError>;
}

/// Reads scan results from a JSON file that an external scanner rewrites.
/// A missing file means nothing is visible yet.
pub struct FileScanSource {
    path: PathBuf,
}

impl FileScanSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ScanSource for FileScanSource {
    async fn scan(&self) -> Result<Vec<ScanRecord>, ScanError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }
}

/// Used when no scan source is configured; every cycle sees nothing.
pub struct NullScanSource;

#[async_trait]
impl ScanSource for NullScanSource {
    async fn scan(&self) -> Result<Vec<ScanRecord>, ScanError> {
        Ok(Vec::new())
    }
}
