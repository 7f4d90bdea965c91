//! Configuration management (TOML)

use crate::store::Retention;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub store: StoreConfig,
    pub predictor: PredictorConfig,
    pub guard: GuardConfig,
    pub vendor: VendorConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub autostart: bool,
    pub sample_interval_secs: u64,
    pub scan_timeout_ms: u64,
    /// How often a sleeping monitor checks for a stop request.
    pub cancel_poll_ms: u64,
    pub event_capacity: usize,
    pub forecast_horizon_secs: u64,
    pub desktop_notifications: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub max_age_secs: u64,
    pub max_count: usize,
    pub aggressive_max_age_secs: u64,
    pub aggressive_max_count: usize,
    /// Only samples this recent count toward channel occupancy.
    pub usage_freshness_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub deadband_dbm: f64,
    pub min_samples: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    pub warning_mb: u64,
    pub critical_mb: u64,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    pub cache_capacity: usize,
    pub remote_enabled: bool,
    pub remote_url: String,
    pub lookup_timeout_ms: u64,
    /// A prefix whose remote lookup failed is not retried for this long.
    #[serde(default = "default_failure_backoff_secs")]
    pub failure_backoff_secs: u64,
}

fn default_failure_backoff_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// JSON file the scan collaborator rewrites with the visible networks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            autostart: true,
            sample_interval_secs: 5,
            scan_timeout_ms: 3_000,
            cancel_poll_ms: 50,
            event_capacity: 64,
            forecast_horizon_secs: 300,
            desktop_notifications: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_age_secs: 3_600,
            max_count: 720,
            aggressive_max_age_secs: 600,
            aggressive_max_count: 120,
            usage_freshness_secs: 30,
        }
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        PredictorConfig {
            alpha: 0.3,
            beta: 0.3,
            gamma: 0.3,
            deadband_dbm: 0.5,
            min_samples: 2,
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig {
            warning_mb: 100,
            critical_mb: 150,
            cooldown_secs: 30,
        }
    }
}

impl Default for VendorConfig {
    fn default() -> Self {
        VendorConfig {
            cache_capacity: 256,
            remote_enabled: true,
            remote_url: "https://api.macvendors.com".to_string(),
            lookup_timeout_ms: 2_000,
            failure_backoff_secs: default_failure_backoff_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            general: GeneralConfig::default(),
            store: StoreConfig::default(),
            predictor: PredictorConfig::default(),
            guard: GuardConfig::default(),
            vendor: VendorConfig::default(),
            scanner: ScannerConfig::default(),
        }
    }
}

impl GeneralConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs.max(1))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn cancel_poll(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_ms.clamp(1, 100))
    }
}

impl StoreConfig {
    pub fn retention(&self) -> Retention {
        Retention {
            max_age: Duration::from_secs(self.max_age_secs),
            max_count: self.max_count,
        }
    }

    /// Tighter bounds applied when memory is critical.
    pub fn aggressive_retention(&self) -> Retention {
        Retention {
            max_age: Duration::from_secs(self.aggressive_max_age_secs.min(self.max_age_secs)),
            max_count: self.aggressive_max_count.min(self.max_count),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "wifiscope")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}
