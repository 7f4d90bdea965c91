//! System notification sender

use crate::guard::{AlertEvent, AlertKind};
use notify_rust::Notification;
use tracing::warn;

pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Show critical memory alerts on the desktop. Warnings stay in the log.
    pub fn alert(&self, alert: &AlertEvent) {
        if !self.enabled || alert.kind != AlertKind::MemoryCritical {
            return;
        }
        if let Err(e) = send_notification("WiFiScope: memory critical", &alert.message) {
            warn!("Failed to show notification: {}", e);
        }
    }
}

pub fn send_notification(summary: &str, body: &str) -> Result<(), notify_rust::error::Error> {
    Notification::new()
        .summary(summary)
        .body(body)
        .appname("WiFiScope")
        .show()?;
    Ok(())
}
