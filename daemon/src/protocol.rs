//! IPC protocol definitions (JSON messages)

use crate::guard::AlertEvent;
use crate::monitor::{MonitorEvent, MonitorStatus, Snapshot};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Status,
    Start {
        #[serde(default)]
        params: StartParams,
    },
    Stop,
    GetSnapshot,
    ResolveVendor { params: ResolveVendorParams },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartParams {
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveVendorParams {
    /// Full hardware address or a bare three-octet prefix.
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Response { id: Option<String>, data: serde_json::Value },
    Snapshot { data: Snapshot },
    Alert { data: AlertEvent },
    Status { data: StatusData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub status: MonitorStatus,
    pub tracked_networks: usize,
    pub stored_samples: usize,
    pub last_sequence: Option<u64>,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Response {
            id: None,
            data: serde_json::json!({ "error": message.into() }),
        }
    }

    pub fn success() -> Self {
        Response::Response {
            id: None,
            data: serde_json::json!({ "success": true }),
        }
    }
}

impl From<MonitorEvent> for Response {
    fn from(event: MonitorEvent) -> Self {
        match event {
            MonitorEvent::Snapshot(data) => Response::Snapshot { data },
            MonitorEvent::Alert(data) => Response::Alert { data },
        }
    }
}
