//! Vendor attribution from OUI prefixes
//!
//! Three tiers, consulted in order: the static table compiled into the
//! binary, a bounded least-recently-used cache, then a best-effort remote
//! lookup whose answers populate the cache. A prefix whose remote lookup
//! failed is held back for a backoff period before it is queried again.

mod oui;

use crate::config::VendorConfig;
use crate::error::LookupError;
use crate::model::OuiPrefix;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const UNKNOWN_VENDOR: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VendorSource {
    Local,
    Cache,
    Remote,
    RemoteFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorMatch {
    pub prefix: OuiPrefix,
    pub vendor: String,
    pub source: VendorSource,
}

impl VendorMatch {
    pub fn is_known(&self) -> bool {
        self.vendor != UNKNOWN_VENDOR
    }
}

/// Look up a prefix in the static table.
pub fn local_vendor(prefix: OuiPrefix) -> Option<&'static str> {
    static TABLE: OnceLock<HashMap<u32, &'static str>> = OnceLock::new();
    TABLE
        .get_or_init(|| oui::OUI_TABLE.iter().copied().collect())
        .get(&prefix.as_u32())
        .copied()
}

pub fn local_table_len() -> usize {
    oui::OUI_TABLE.len()
}

/// Remote registry lookup. `Ok(None)` means the registry has no entry.
#[async_trait]
pub trait VendorLookup: Send + Sync {
    async fn lookup(&self, prefix: OuiPrefix) -> Result<Option<String>, LookupError>;
}

/// Queries a macvendors-style HTTP API: `GET {base}/{AA:BB:CC}` answers
/// with the vendor name as plain text, or 404 when unassigned.
pub struct HttpVendorLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVendorLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wifiscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VendorLookup for HttpVendorLookup {
    async fn lookup(&self, prefix: OuiPrefix) -> Result<Option<String>, LookupError> {
        let url = format!("{}/{}", self.base_url, prefix);
        let response = self.client.get(&url).send().await?;
        match response.status().as_u16() {
            200 => {
                let name = response.text().await?.trim().to_string();
                Ok(if name.is_empty() { None } else { Some(name) })
            }
            404 => Ok(None),
            code => Err(LookupError::Status(code)),
        }
    }
}

/// Fixed-capacity map evicting the least recently used prefix.
struct RecencyCache {
    capacity: usize,
    entries: HashMap<OuiPrefix, String>,
    order: VecDeque<OuiPrefix>,
}

impl RecencyCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    fn touch(&mut self, prefix: OuiPrefix) {
        self.order.retain(|p| *p != prefix);
        self.order.push_back(prefix);
    }

    fn get(&mut self, prefix: OuiPrefix) -> Option<String> {
        let vendor = self.entries.get(&prefix).cloned()?;
        self.touch(prefix);
        Some(vendor)
    }

    fn put(&mut self, prefix: OuiPrefix, vendor: String) {
        if self.entries.insert(prefix, vendor).is_none() && self.entries.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.touch(prefix);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct VendorResolver {
    cache: Mutex<RecencyCache>,
    remote: Option<Arc<dyn VendorLookup>>,
    lookup_timeout: Duration,
    failure_backoff: Duration,
    failed: Mutex<HashMap<OuiPrefix, Instant>>,
}

impl VendorResolver {
    pub fn new(config: &VendorConfig, remote: Option<Arc<dyn VendorLookup>>) -> Self {
        Self {
            cache: Mutex::new(RecencyCache::new(config.cache_capacity)),
            remote,
            lookup_timeout: Duration::from_millis(config.lookup_timeout_ms),
            failure_backoff: Duration::from_secs(config.failure_backoff_secs),
            failed: Mutex::new(HashMap::new()),
        }
    }

    /// Build the resolver with the HTTP remote tier when it is enabled.
    pub fn from_config(config: &VendorConfig) -> Self {
        let remote: Option<Arc<dyn VendorLookup>> = if config.remote_enabled {
            match HttpVendorLookup::new(&config.remote_url, Duration::from_millis(config.lookup_timeout_ms)) {
                Ok(lookup) => Some(Arc::new(lookup)),
                Err(e) => {
                    warn!("Remote vendor lookup disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        Self::new(config, remote)
    }

    /// Answer from the local table or cache without touching the network.
    pub fn resolve_cached(&self, prefix: OuiPrefix) -> Option<VendorMatch> {
        if let Some(vendor) = local_vendor(prefix) {
            return Some(VendorMatch {
                prefix,
                vendor: vendor.to_string(),
                source: VendorSource::Local,
            });
        }
        self.cache.lock().get(prefix).map(|vendor| VendorMatch {
            prefix,
            vendor,
            source: VendorSource::Cache,
        })
    }

    /// Resolve a prefix. Never fails: an unreachable or failing remote
    /// yields `"Unknown"` with [`VendorSource::RemoteFailed`]. Failures are
    /// not cached, but the prefix is not retried until its backoff expires.
    pub async fn resolve(&self, prefix: OuiPrefix) -> VendorMatch {
        if let Some(found) = self.resolve_cached(prefix) {
            return found;
        }

        let failed = VendorMatch {
            prefix,
            vendor: UNKNOWN_VENDOR.to_string(),
            source: VendorSource::RemoteFailed,
        };
        let Some(remote) = &self.remote else {
            return failed;
        };
        if self.backing_off(prefix, Instant::now()) {
            return failed;
        }

        let outcome = match tokio::time::timeout(self.lookup_timeout, remote.lookup(prefix)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(self.lookup_timeout)),
        };
        match outcome {
            Ok(found) => {
                let vendor = found.unwrap_or_else(|| UNKNOWN_VENDOR.to_string());
                debug!("Remote vendor lookup {} -> {}", prefix, vendor);
                self.cache.lock().put(prefix, vendor.clone());
                VendorMatch {
                    prefix,
                    vendor,
                    source: VendorSource::Remote,
                }
            }
            Err(e) => {
                warn!("Vendor lookup for {} failed: {}, retrying after {:?}", prefix, e, self.failure_backoff);
                self.record_failure(prefix, Instant::now());
                failed
            }
        }
    }

    fn backing_off(&self, prefix: OuiPrefix, now: Instant) -> bool {
        let mut failed = self.failed.lock();
        match failed.get(&prefix) {
            Some(at) if now.duration_since(*at) < self.failure_backoff => true,
            Some(_) => {
                failed.remove(&prefix);
                false
            }
            None => false,
        }
    }

    fn record_failure(&self, prefix: OuiPrefix, now: Instant) {
        let mut failed = self.failed.lock();
        let backoff = self.failure_backoff;
        failed.retain(|_, at| now.duration_since(*at) < backoff);
        failed.insert(prefix, now);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().len()
    }
}
