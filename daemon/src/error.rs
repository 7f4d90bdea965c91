//! Error types

use std::time::Duration;
use thiserror::Error;

/// Failure to parse a hardware address or OUI prefix.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid hardware address '{input}': expected {expected}")]
pub struct AddressParseError {
    pub input: String,
    pub expected: &'static str,
}

/// Errors raised by scan sources.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan source unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read scan results: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scan results: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised by a remote vendor lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("vendor lookup request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("vendor lookup returned HTTP {0}")]
    Status(u16),

    #[error("vendor lookup timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,

    #[error("monitor is not running")]
    NotRunning,

    #[error("invalid sample for {network}: {reason}")]
    InvalidSample { network: String, reason: String },

    #[error("scan timed out after {0:?}")]
    ScanTimeout(Duration),

    #[error(transparent)]
    Scan(#[from] ScanError),
}
