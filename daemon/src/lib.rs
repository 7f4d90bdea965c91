//! WiFi telemetry analysis and monitoring engine
//!
//! Samples visible networks in the background and turns raw readings into
//! channel interference scores, signal trend forecasts, quality grades and
//! vendor attribution, within a bounded memory budget.

pub mod config;
pub mod control;
pub mod error;
pub mod guard;
pub mod interference;
pub mod memory;
pub mod model;
pub mod monitor;
pub mod notifier;
pub mod predictor;
pub mod protocol;
pub mod quality;
pub mod scanner;
pub mod socket;
pub mod store;
pub mod vendor;

pub use error::MonitorError;
pub use monitor::{Monitor, MonitorEvent, MonitorStatus, Snapshot};
