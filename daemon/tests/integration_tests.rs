//! Integration tests for the monitoring engine

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wifiscope_daemon::{
    config::Config,
    control::Controller,
    error::{LookupError, ScanError},
    guard::{AlertEvent, AlertKind, GuardState},
    memory::MemoryProbe,
    model::{Band, OuiPrefix},
    monitor::{Monitor, MonitorEvent, MonitorStatus, Snapshot},
    predictor::Forecast,
    protocol::{Request, ResolveVendorParams, Response, StartParams},
    scanner::{FileScanSource, ScanRecord, ScanSource},
    socket::RequestHandler,
    vendor::{VendorLookup, VendorResolver, VendorSource},
    MonitorError,
};

const MB: u64 = 1024 * 1024;

struct StaticScan {
    records: Mutex<Vec<ScanRecord>>,
}

impl StaticScan {
    fn new(records: Vec<ScanRecord>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
        })
    }
}

#[async_trait]
impl ScanSource for StaticScan {
    async fn scan(&self) -> Result<Vec<ScanRecord>, ScanError> {
        Ok(self.records.lock().clone())
    }
}

struct SlowScan(Duration);

#[async_trait]
impl ScanSource for SlowScan {
    async fn scan(&self) -> Result<Vec<ScanRecord>, ScanError> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }
}

struct FixedProbe(AtomicU64);

impl FixedProbe {
    fn mb(mb: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(mb * MB)))
    }
}

impl MemoryProbe for FixedProbe {
    fn rss_bytes(&self) -> Option<u64> {
        Some(self.0.load(Ordering::SeqCst))
    }
}

struct SlowLookup {
    delay: Duration,
    calls: AtomicU64,
}

#[async_trait]
impl VendorLookup for SlowLookup {
    async fn lookup(&self, _prefix: OuiPrefix) -> Result<Option<String>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(Some("Slow Vendor".to_string()))
    }
}

fn record(ssid: &str, bssid: &str, rssi: i32, channel: u8) -> ScanRecord {
    ScanRecord {
        ssid: ssid.to_string(),
        bssid: bssid.to_string(),
        rssi_dbm: rssi,
        channel,
        band: Some(Band::Band2_4GHz),
        bandwidth_mhz: 20,
    }
}

fn crowded_2_4() -> Vec<ScanRecord> {
    vec![
        record("alpha", "b8:27:eb:00:00:01", -55, 6),
        record("beta", "00:00:0c:00:00:02", -55, 6),
        record("gamma", "fe:dc:ba:00:00:03", -55, 11),
    ]
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.vendor.remote_enabled = false;
    config.general.scan_timeout_ms = 500;
    config
}

fn monitor_with(config: Config, scanner: Arc<dyn ScanSource>, probe: Arc<dyn MemoryProbe>) -> Arc<Monitor> {
    let vendors = Arc::new(VendorResolver::new(&config.vendor, None));
    Arc::new(Monitor::new(config, scanner, probe, vendors))
}

async fn next_snapshot(rx: &mut tokio::sync::broadcast::Receiver<MonitorEvent>) -> Snapshot {
    let deadline = Duration::from_secs(5);
    loop {
        match tokio::time::timeout(deadline, rx.recv()).await {
            Ok(Ok(MonitorEvent::Snapshot(snapshot))) => return snapshot,
            Ok(Ok(MonitorEvent::Alert(_))) => continue,
            Ok(Err(e)) => panic!("event stream error: {e}"),
            Err(_) => panic!("no snapshot within {deadline:?}"),
        }
    }
}

/// Test the full cycle: two networks on channel 6, one on channel 11
#[tokio::test]
async fn test_crowded_channel_ranks_below_quiet_one() {
    let monitor = monitor_with(test_config(), StaticScan::new(crowded_2_4()), FixedProbe::mb(10));
    let mut rx = monitor.subscribe();
    monitor.start(Duration::from_millis(20)).unwrap();

    let snapshot = next_snapshot(&mut rx).await;
    monitor.stop().await.unwrap();

    assert!(!snapshot.scan_skipped);
    assert_eq!(snapshot.networks.len(), 3);
    let score = |channel: u8| {
        snapshot
            .channels
            .iter()
            .find(|c| c.band == Band::Band2_4GHz && c.channel == channel)
            .map(|c| c.score)
            .unwrap()
    };
    assert!(score(11) > score(6));
    let recommended = snapshot.recommended.iter().find(|r| r.band == Band::Band2_4GHz).unwrap();
    assert_ne!(recommended.channel, 6);

    let alpha = snapshot.networks.iter().find(|n| n.network.ssid == "alpha").unwrap();
    assert_eq!(alpha.vendor.vendor, "Raspberry Pi");
    assert_eq!(alpha.vendor.source, VendorSource::Local);
    let gamma = snapshot.networks.iter().find(|n| n.network.ssid == "gamma").unwrap();
    assert_eq!(gamma.vendor.source, VendorSource::RemoteFailed);
    assert_eq!(gamma.grade.score, 88);
}

/// Test that stop during the inter-cycle sleep returns promptly
#[tokio::test]
async fn test_stop_mid_sleep_is_prompt() {
    let monitor = monitor_with(test_config(), StaticScan::new(crowded_2_4()), FixedProbe::mb(10));
    let mut rx = monitor.subscribe();
    monitor.start(Duration::from_secs(30)).unwrap();
    next_snapshot(&mut rx).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let started = Instant::now();
    monitor.stop().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(monitor.status(), MonitorStatus::Stopped);
    assert!(elapsed < Duration::from_millis(250), "stop took {elapsed:?}");
}

/// Test that a hung scan is skipped and does not block stop
#[tokio::test]
async fn test_slow_scan_is_skipped_and_cancellable() {
    let mut config = test_config();
    config.general.scan_timeout_ms = 50;
    let monitor = monitor_with(config, Arc::new(SlowScan(Duration::from_secs(10))), FixedProbe::mb(10));
    let mut rx = monitor.subscribe();
    monitor.start(Duration::from_millis(20)).unwrap();
    let snapshot = next_snapshot(&mut rx).await;
    assert!(snapshot.scan_skipped);
    assert!(snapshot.networks.is_empty());
    let next = next_snapshot(&mut rx).await;
    assert!(next.sequence > snapshot.sequence);
    monitor.stop().await.unwrap();

    let mut config = test_config();
    config.general.scan_timeout_ms = 30_000;
    let stuck = monitor_with(config, Arc::new(SlowScan(Duration::from_secs(60))), FixedProbe::mb(10));
    stuck.start(Duration::from_millis(20)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    stuck.stop().await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(250));
    assert!(stuck.latest_snapshot().is_none());
}

/// Test that sequence numbers keep increasing across restarts
#[tokio::test]
async fn test_sequence_is_monotonic_across_restart() {
    let monitor = monitor_with(test_config(), StaticScan::new(crowded_2_4()), FixedProbe::mb(10));
    let mut rx = monitor.subscribe();
    monitor.start(Duration::from_millis(10)).unwrap();
    let mut last = 0;
    for _ in 0..3 {
        let snapshot = next_snapshot(&mut rx).await;
        assert!(snapshot.sequence > last);
        last = snapshot.sequence;
    }
    monitor.stop().await.unwrap();

    let mut rx = monitor.subscribe();
    monitor.start(Duration::from_millis(10)).unwrap();
    let after = next_snapshot(&mut rx).await;
    monitor.stop().await.unwrap();
    assert!(after.sequence > last);
}

/// Test that a second start is refused and stop on an idle monitor errors
#[tokio::test]
async fn test_lifecycle_transitions() {
    let monitor = monitor_with(test_config(), StaticScan::new(Vec::new()), FixedProbe::mb(10));
    assert_eq!(monitor.status(), MonitorStatus::Stopped);
    assert!(matches!(monitor.stop().await, Err(MonitorError::NotRunning)));

    monitor.start(Duration::from_millis(50)).unwrap();
    assert_eq!(monitor.status(), MonitorStatus::Running);
    assert!(matches!(
        monitor.start(Duration::from_millis(50)),
        Err(MonitorError::AlreadyRunning)
    ));
    monitor.stop().await.unwrap();
    assert_eq!(monitor.status(), MonitorStatus::Stopped);
}

/// Test that sustained critical memory raises exactly one alert
#[tokio::test]
async fn test_memory_critical_alerts_once() {
    let monitor = monitor_with(test_config(), StaticScan::new(crowded_2_4()), FixedProbe::mb(200));
    let mut rx = monitor.subscribe();
    monitor.start(Duration::from_millis(5)).unwrap();

    let mut alerts: Vec<AlertEvent> = Vec::new();
    let mut snapshots = 0;
    while snapshots < 8 {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(MonitorEvent::Alert(alert))) => alerts.push(alert),
            Ok(Ok(MonitorEvent::Snapshot(snapshot))) => {
                assert_eq!(snapshot.memory.state, GuardState::Critical);
                assert!(snapshot.memory.stored_samples <= test_config().store.aggressive_max_count * 3);
                snapshots += 1;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    monitor.stop().await.unwrap();

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::MemoryCritical);
}

/// Test that forecasts become available after the second cycle
#[tokio::test]
async fn test_forecast_ready_after_two_cycles() {
    let monitor = monitor_with(test_config(), StaticScan::new(crowded_2_4()), FixedProbe::mb(10));
    let mut rx = monitor.subscribe();
    monitor.start(Duration::from_millis(20)).unwrap();

    let first = next_snapshot(&mut rx).await;
    assert!(first
        .networks
        .iter()
        .all(|n| matches!(n.forecast, Forecast::NotReady { samples: 1, .. })));
    let second = next_snapshot(&mut rx).await;
    monitor.stop().await.unwrap();
    assert!(second.networks.iter().all(|n| n.forecast.is_ready()));
}

/// Test scan results delivered through a JSON file
#[tokio::test]
async fn test_file_scan_source() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scan.json");
    let source = FileScanSource::new(&path);
    assert!(source.scan().await.unwrap().is_empty());

    std::fs::write(&path, serde_json::to_string(&crowded_2_4()).unwrap()).unwrap();
    assert_eq!(source.scan().await.unwrap().len(), 3);

    std::fs::write(&path, "{ not json").unwrap();
    assert!(source.scan().await.is_err());
}

/// Test the control surface used by socket clients
#[tokio::test]
async fn test_controller_requests() {
    let monitor = monitor_with(test_config(), StaticScan::new(crowded_2_4()), FixedProbe::mb(10));
    let controller = Controller::new(Arc::clone(&monitor));

    assert!(matches!(controller.handle(Request::Ping).await, Response::Pong));
    assert!(matches!(
        controller.handle(Request::GetSnapshot).await,
        Response::Response { .. }
    ));

    let resolved = controller
        .handle(Request::ResolveVendor {
            params: ResolveVendorParams {
                address: "B8-27-EB-12-34-56".to_string(),
            },
        })
        .await;
    match resolved {
        Response::Response { data, .. } => {
            assert_eq!(data["vendor"], "Raspberry Pi");
            assert_eq!(data["source"], "local");
        }
        other => panic!("unexpected {other:?}"),
    }

    let mut rx = monitor.subscribe();
    let started = controller
        .handle(Request::Start {
            params: StartParams { interval_secs: Some(1) },
        })
        .await;
    assert!(matches!(started, Response::Response { .. }));
    next_snapshot(&mut rx).await;

    match controller.handle(Request::Status).await {
        Response::Status { data } => {
            assert_eq!(data.status, MonitorStatus::Running);
            assert_eq!(data.tracked_networks, 3);
            assert!(data.last_sequence.is_some());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(
        controller.handle(Request::GetSnapshot).await,
        Response::Snapshot { .. }
    ));
    controller.handle(Request::Stop).await;
    assert_eq!(monitor.status(), MonitorStatus::Stopped);
}

/// Test that requests and events serialize as tagged JSON
#[test]
fn test_protocol_wire_format() {
    let request: Request = serde_json::from_str(r#"{"cmd":"start","params":{"interval_secs":3}}"#).unwrap();
    assert!(matches!(request, Request::Start { params } if params.interval_secs == Some(3)));
    let request: Request = serde_json::from_str(r#"{"cmd":"stop"}"#).unwrap();
    assert!(matches!(request, Request::Stop));

    let alert = Response::Alert {
        data: AlertEvent {
            kind: AlertKind::MemoryCritical,
            message: "over".to_string(),
            timestamp_ms: 1,
        },
    };
    let json = serde_json::to_value(&alert).unwrap();
    assert_eq!(json["type"], "alert");
    assert_eq!(json["data"]["kind"], "memory-critical");
}

/// Test that stop is not held up by slow remote vendor lookups
#[tokio::test]
async fn test_stop_during_slow_vendor_lookups_is_prompt() {
    let mut config = Config::default();
    config.vendor.lookup_timeout_ms = 10_000;
    let records = (1..=5)
        .map(|n| record(&format!("net{n}"), &format!("fe:dc:0{n}:00:00:01"), -60, 1))
        .collect();
    let remote = Arc::new(SlowLookup {
        delay: Duration::from_secs(10),
        calls: AtomicU64::new(0),
    });
    let vendors = Arc::new(VendorResolver::new(&config.vendor, Some(remote.clone())));
    let monitor = Monitor::new(config, StaticScan::new(records), FixedProbe::mb(10), vendors);

    monitor.start(Duration::from_secs(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(remote.calls.load(Ordering::SeqCst) >= 1);

    let started = Instant::now();
    monitor.stop().await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(250), "stop took {elapsed:?}");
    assert_eq!(monitor.status(), MonitorStatus::Stopped);
    assert!(monitor.latest_snapshot().is_none());
}

/// Test that concurrent start and stop calls never leave a loop running
/// behind a stopped or stopping status
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_start_stop_stays_consistent() {
    let monitor = monitor_with(test_config(), StaticScan::new(crowded_2_4()), FixedProbe::mb(10));
    for _ in 0..50 {
        let starter = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.start(Duration::from_millis(5)).is_ok() })
        };
        let stopper = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.stop().await })
        };
        assert!(starter.await.unwrap());
        let _ = stopper.await.unwrap();

        let status = monitor.status();
        assert_ne!(status, MonitorStatus::Stopping);
        if status == MonitorStatus::Running {
            monitor.stop().await.unwrap();
        }
        assert_eq!(monitor.status(), MonitorStatus::Stopped);
    }

    let mut rx = monitor.subscribe();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "a monitor loop outlived stop");
}
