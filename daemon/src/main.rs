use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wifiscope_daemon::{
    config::Config,
    control::Controller,
    memory::ProcMemoryProbe,
    monitor::{Monitor, MonitorEvent},
    notifier::Notifier,
    scanner::{FileScanSource, NullScanSource, ScanSource},
    socket::{handle_client, SocketServer},
    vendor::{local_table_len, VendorResolver},
};

fn load_config() -> Config {
    let config_path = Config::config_path();
    if config_path.exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        info!("No config file found, using defaults");
        Config::default()
    }
}

/// Forward critical alerts to the desktop until the event stream closes.
async fn notification_loop(monitor: Arc<Monitor>, notifier: Notifier) {
    let mut events = monitor.subscribe();
    loop {
        match events.recv().await {
            Ok(MonitorEvent::Alert(alert)) => notifier.alert(&alert),
            Ok(MonitorEvent::Snapshot(_)) => {}
            Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("WiFiScope daemon starting...");

    let config = load_config();

    let scanner: Arc<dyn ScanSource> = match &config.scanner.snapshot_path {
        Some(path) => {
            info!("Reading scan results from {:?}", path);
            Arc::new(FileScanSource::new(path.clone()))
        }
        None => {
            warn!("No scan source configured; cycles will see no networks");
            Arc::new(NullScanSource)
        }
    };
    let vendors = Arc::new(VendorResolver::from_config(&config.vendor));
    info!("Vendor table loaded with {} prefixes", local_table_len());

    let notifier = Notifier::new(config.general.desktop_notifications);
    let autostart = config.general.autostart;
    let interval = config.general.sample_interval();
    let monitor = Arc::new(Monitor::new(
        config,
        scanner,
        Arc::new(ProcMemoryProbe::new()),
        vendors,
    ));

    tokio::spawn(notification_loop(Arc::clone(&monitor), notifier));

    if autostart {
        monitor.start(interval)?;
    }

    let socket_path = SocketServer::socket_path();
    let server = SocketServer::bind(&socket_path).await?;
    let controller = Arc::new(Controller::new(Arc::clone(&monitor)));

    info!("Daemon ready, listening for connections...");

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let controller = Arc::clone(&controller);
                    let events = monitor.subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, events, controller).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    if let Err(e) = monitor.stop().await {
        info!("Monitor already idle: {}", e);
    }
    Ok(())
}
