//! Request handling for the control socket

use crate::model::OuiPrefix;
use crate::monitor::Monitor;
use crate::protocol::{Request, Response, StatusData};
use crate::socket::RequestHandler;
use std::sync::Arc;
use std::time::Duration;

pub struct Controller {
    monitor: Arc<Monitor>,
}

impl Controller {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }

    fn status(&self) -> StatusData {
        let store = self.monitor.store();
        StatusData {
            status: self.monitor.status(),
            tracked_networks: store.networks().len(),
            stored_samples: store.len(),
            last_sequence: self.monitor.latest_snapshot().map(|s| s.sequence),
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for Controller {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::Status => Response::Status { data: self.status() },

            Request::Start { params } => {
                let interval = params
                    .interval_secs
                    .map(|secs| Duration::from_secs(secs.max(1)))
                    .unwrap_or_else(|| self.monitor.config().general.sample_interval());
                match self.monitor.start(interval) {
                    Ok(()) => Response::success(),
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::Stop => match self.monitor.stop().await {
                Ok(()) => Response::success(),
                Err(e) => Response::error(e.to_string()),
            },

            Request::GetSnapshot => match self.monitor.latest_snapshot() {
                Some(data) => Response::Snapshot { data },
                None => Response::error("no snapshot published yet"),
            },

            Request::ResolveVendor { params } => match OuiPrefix::parse(&params.address) {
                Ok(prefix) => {
                    let found = self.monitor.vendors().resolve(prefix).await;
                    Response::Response {
                        id: None,
                        data: serde_json::json!(found),
                    }
                }
                Err(e) => Response::error(e.to_string()),
            },
        }
    }
}
