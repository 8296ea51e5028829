//! Cycle tests against an in-memory inventory source and a recording sink

use super::*;
use crate::cache::CounterCache;
use crate::classify::{ClassifierThresholds, Severity, LABEL_HIGH_BANDWIDTH, LABEL_LINK_DOWN};
use crate::error::{IngestError, SourceError};
use crate::health::HealthRegistry;
use crate::models::{Device, EventRecord, HistorySample, MetricItem, MetricRecord, ValueKind};
use crate::sink::IngestSink;
use crate::source::{async_trait, InventorySource};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const HOST: &str = "core-sw-01";

#[derive(Default)]
struct MockSource {
    devices: Vec<Device>,
    items: HashMap<String, Vec<MetricItem>>,
    history: HashMap<String, Vec<HistorySample>>,
    broken_hosts: HashSet<String>,
    discover_calls: AtomicUsize,
}

impl MockSource {
    fn with_device(self, host: &str, items: Vec<MetricItem>) -> Self {
        self.with_typed_device(host, None, items)
    }

    fn with_typed_device(mut self, host: &str, kind: Option<&str>, items: Vec<MetricItem>) -> Self {
        let hostid = format!("100{}", self.devices.len());
        self.devices.push(Device {
            hostid: hostid.clone(),
            host: host.to_string(),
            name: host.to_string(),
            location: Some("DC1 rack 4".to_string()),
            inventory_type: kind.map(str::to_string),
        });
        self.items.insert(hostid, items);
        self
    }

    fn with_history(mut self, itemid: &str, samples: &[(&str, &str)]) -> Self {
        self.history.insert(
            itemid.to_string(),
            samples
                .iter()
                .map(|(value, clock)| HistorySample {
                    value: value.to_string(),
                    clock: clock.to_string(),
                })
                .collect(),
        );
        self
    }

    fn with_broken_host(mut self, host: &str) -> Self {
        self.broken_hosts.insert(host.to_string());
        self
    }
}

#[async_trait]
impl InventorySource for MockSource {
    async fn discover_devices(&self) -> Result<Vec<Device>, SourceError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.clone())
    }

    async fn items_for(&self, device: &Device) -> Result<Vec<MetricItem>, SourceError> {
        if self.broken_hosts.contains(&device.host) {
            return Err(SourceError::Rpc {
                method: "item.get".to_string(),
                code: -32500,
                message: "Application error".to_string(),
            });
        }
        Ok(self.items.get(&device.hostid).cloned().unwrap_or_default())
    }

    async fn history_last_two(&self, item: &MetricItem) -> Result<Vec<HistorySample>, SourceError> {
        Ok(self.history.get(&item.id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingSink {
    metrics: Mutex<Vec<MetricRecord>>,
    events: Mutex<Vec<EventRecord>>,
    fail: bool,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn refuse(&self, path: &str) -> IngestError {
        IngestError::Status {
            url: format!("http://backend:8000{}", path),
            status: 503,
            body: "service unavailable".to_string(),
        }
    }

    fn events(&self) -> Vec<EventRecord> {
        self.events.lock().unwrap().clone()
    }

    fn metrics(&self) -> Vec<MetricRecord> {
        self.metrics.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngestSink for RecordingSink {
    async fn send_metrics(&self, metrics: &[MetricRecord]) -> Result<usize, IngestError> {
        if self.fail {
            return Err(self.refuse("/ingest/metrics"));
        }
        self.metrics.lock().unwrap().extend_from_slice(metrics);
        Ok(metrics.len())
    }

    async fn send_events(&self, events: &[EventRecord]) -> Result<usize, IngestError> {
        if self.fail {
            return Err(self.refuse("/ingest/events"));
        }
        self.events.lock().unwrap().extend_from_slice(events);
        Ok(events.len())
    }
}

fn item(id: &str, name: &str, key: &str, last_value: &str) -> MetricItem {
    MetricItem {
        id: id.to_string(),
        name: name.to_string(),
        key: key.to_string(),
        last_value: Some(last_value.to_string()),
        value_type: 3,
        units: String::new(),
        declared_width: None,
    }
}

/// Bit-rate presentation over an octet counter
fn bits_in(id: &str, last_value: &str) -> MetricItem {
    item(id, "Interface Gi0/3: Bits received", "net.if.in[ifHCInOctets.3]", last_value)
}

fn clock_130() -> i64 {
    130
}

fn orchestrator(source: MockSource, sink: Arc<RecordingSink>) -> CycleOrchestrator {
    CycleOrchestratorBuilder::new()
        .source(Arc::new(source))
        .sink(sink)
        .clock(clock_130)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_history_rate_classified_ok() {
    let source = MockSource::default()
        .with_device(HOST, vec![bits_in("2001", "1500")])
        .with_history("2001", &[("1500", "130"), ("1000", "100")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    let report = orch.run_cycle().await;

    assert_eq!(report.devices, 1);
    assert_eq!(report.instances, 1);
    assert_eq!(report.rates_computed, 1);
    assert_eq!(report.metrics_emitted, 1);
    assert_eq!(report.events_emitted, 0);
    assert!(sink.events().is_empty());

    let metrics = sink.metrics();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].ts, 130);
    assert_eq!(metrics[0].metric, "net.if.in[ifHCInOctets.3]");
    assert_eq!(metrics[0].value, serde_json::json!(1500));
    assert_eq!(metrics[0].value_type, ValueKind::Counter);
    assert_eq!(metrics[0].meta.device_id, HOST);
    assert_eq!(metrics[0].meta.ifindex.as_deref(), Some("3"));
    assert_eq!(metrics[0].meta.location.as_deref(), Some("DC1 rack 4"));
}

#[tokio::test]
async fn test_cache_fallback_rate_value() {
    let source = MockSource::default().with_device(HOST, vec![bits_in("2001", "1500")]);
    let sink = Arc::new(RecordingSink::default());

    // Threshold just below the expected 500 / 30 * 8 bps so it surfaces as evidence
    let mut orch = CycleOrchestratorBuilder::new()
        .source(Arc::new(source))
        .sink(sink.clone())
        .clock(clock_130)
        .thresholds(ClassifierThresholds {
            saturation_ratio: 0.9,
            absolute_threshold: 133.0,
        })
        .build()
        .unwrap();
    orch.cache_mut().put("2001", 1000, 100);

    let report = orch.run_cycle().await;
    assert_eq!(report.rates_computed, 1);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    let rate = events[0].evidence.as_ref().unwrap().rate_bps.unwrap();
    assert!((rate - 500.0 / 30.0 * 8.0).abs() < 1e-9);
    assert_eq!(events[0].labels, vec![LABEL_HIGH_BANDWIDTH.to_string()]);

    let entry = orch.cache().get("2001").unwrap();
    assert_eq!((entry.value, entry.ts), (1500, 130));
}

#[tokio::test]
async fn test_cache_fallback_octets_ok_with_default_thresholds() {
    let source = MockSource::default().with_device(HOST, vec![bits_in("2001", "1500")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());
    orch.cache_mut().put("2001", 1000, 100);

    let report = orch.run_cycle().await;

    // 133.3 bps is far below the 100 Mbps fallback threshold
    assert_eq!(report.rates_computed, 1);
    assert_eq!(report.events_emitted, 0);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_bits_presentation_over_octets_is_scaled() {
    // 1_187_500 octets over 10s on a 1 Mbps link; unscaled it would read 11.9%
    let items = vec![
        item("4101", "Interface Gi0/4: Speed", "net.if.speed[ifHighSpeed.4]", "1"),
        item("4102", "Interface Gi0/4: Bits received", "net.if.in[ifHCInOctets.4]", "1187500"),
    ];
    let source = MockSource::default()
        .with_device(HOST, items)
        .with_history("4102", &[("1187500", "110"), ("0", "100")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    let report = orch.run_cycle().await;

    assert_eq!(report.rates_computed, 1);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].status, "High bandwidth (95.0% of link)");
    assert!((events[0].evidence.as_ref().unwrap().rate_bps.unwrap() - 950_000.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_bits_declared_in_units_not_rescaled() {
    let items = vec![
        item("4201", "Interface Gi0/4: Speed", "net.if.speed[ifHighSpeed.4]", "1"),
        MetricItem {
            units: "bps".to_string(),
            ..item("4202", "Interface Gi0/4: Bits received", "net.if.in[ifHCInOctets.4]", "9500000")
        },
    ];
    // Already bit-valued: 950 kbps straight from the samples
    let source = MockSource::default()
        .with_device(HOST, items)
        .with_history("4202", &[("9500000", "110"), ("0", "100")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    orch.run_cycle().await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, "High bandwidth (95.0% of link)");
}

#[tokio::test]
async fn test_first_observation_is_idle_without_event() {
    let source = MockSource::default().with_device(HOST, vec![bits_in("2001", "1000")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    let report = orch.run_cycle().await;

    assert_eq!(report.unavailable(RateUnavailable::NoBaseline), 1);
    assert_eq!(report.metrics_emitted, 1);
    assert_eq!(report.events_emitted, 0);
    assert!(sink.events().is_empty());
    assert_eq!(orch.cache().get("2001").unwrap().value, 1000);
}

#[tokio::test]
async fn test_idle_events_when_enabled() {
    let source = MockSource::default().with_device(HOST, vec![bits_in("2001", "1000")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = CycleOrchestratorBuilder::new()
        .source(Arc::new(source))
        .sink(sink.clone())
        .profile(PipelineProfile {
            emit_idle_events: true,
            ..Default::default()
        })
        .build()
        .unwrap();

    orch.run_cycle().await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Info);
    assert_eq!(events[0].status, "No rate available (idle or insufficient history)");
    assert!(events[0].labels.is_empty());
}

#[tokio::test]
async fn test_down_interface_flags_every_item() {
    let items = vec![
        item("3001", "Interface Gi0/3: ifDescr", "net.if.descr[ifDescr.3]", "GigabitEthernet0/3"),
        item("3002", "Interface Gi0/3: Operational status", "net.if.status[ifOperStatus.3]", "2"),
        bits_in("3003", "42"),
    ];
    let source = MockSource::default()
        .with_device(HOST, items)
        .with_history("3003", &[("1000000", "130"), ("0", "100")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    let report = orch.run_cycle().await;

    assert_eq!(report.instances, 3);
    assert_eq!(report.events_emitted, 3);
    for event in sink.events() {
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.labels, vec![LABEL_LINK_DOWN.to_string()]);
        assert_eq!(event.iface.as_deref(), Some("GigabitEthernet0/3"));
        assert_eq!(event.status, "Operational state != up - check link/config");
        assert_eq!(event.detected_at, 130);
    }
}

#[tokio::test]
async fn test_saturated_link_event_with_evidence() {
    // 1 Mbps link; 1_187_500 octets over 10s is 950 kbps
    let items = vec![
        item("4001", "Interface Gi0/4: Speed", "net.if.speed[ifHighSpeed.4]", "1"),
        item("4002", "Interface Gi0/4: Incoming ifHCInOctets", "net.if.in[ifHCInOctets.4]", "1187500"),
    ];
    let source = MockSource::default()
        .with_device(HOST, items)
        .with_history("4002", &[("1187500", "110"), ("0", "100")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    orch.run_cycle().await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].status, "High bandwidth (95.0% of link)");
    let evidence = events[0].evidence.as_ref().unwrap();
    assert_eq!(evidence.link_speed_bps, Some(1_000_000.0));
    assert!((evidence.rate_bps.unwrap() - 950_000.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_rate_beyond_link_capacity_discarded() {
    let items = vec![
        item("5001", "Interface Gi0/5: Speed", "net.if.speed[ifHighSpeed.5]", "1"),
        item("5002", "Interface Gi0/5: Incoming ifHCInOctets", "net.if.in[ifHCInOctets.5]", "0"),
    ];
    // 80 Mbps on a 1 Mbps link
    let source = MockSource::default()
        .with_device(HOST, items)
        .with_history("5002", &[("100000000", "110"), ("0", "100")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    let report = orch.run_cycle().await;

    assert_eq!(report.rates_computed, 0);
    assert_eq!(report.unavailable(RateUnavailable::ExceedsLinkCapacity), 1);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_sink_failure_still_flushes_cache() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("counter_cache.json");

    let items = vec![
        item("6001", "Interface Gi0/6: Operational status", "net.if.status[ifOperStatus.6]", "down"),
        bits_in("6002", "777"),
    ];
    let source = MockSource::default().with_device(HOST, items);
    let sink = Arc::new(RecordingSink::failing());
    let health = HealthRegistry::new();
    let mut orch = CycleOrchestratorBuilder::new()
        .source(Arc::new(source))
        .sink(sink)
        .cache(CounterCache::load(&cache_path, 100))
        .health(health.clone())
        .clock(clock_130)
        .build()
        .unwrap();

    let report = orch.run_cycle().await;

    assert_eq!(report.transport_failures, 2);
    assert!(report.cache_persisted);
    assert_eq!(orch.state(), CycleState::Idle);

    let reloaded = CounterCache::load(&cache_path, 100);
    assert_eq!(reloaded.get("6002").map(|e| (e.value, e.ts)), Some((777, 130)));

    let status = health.health().await;
    assert_eq!(
        status.components[crate::health::components::INGEST].status,
        crate::health::ComponentStatus::Degraded
    );
    assert!(health.readiness().await.ready);
}

#[tokio::test]
async fn test_failing_device_does_not_abort_cycle() {
    let source = MockSource::default()
        .with_device("edge-rtr-01", vec![bits_in("7001", "10")])
        .with_device(HOST, vec![bits_in("7002", "20")])
        .with_broken_host("edge-rtr-01");
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    let report = orch.run_cycle().await;

    assert_eq!(report.devices, 2);
    assert_eq!(report.source_errors, 1);
    assert_eq!(report.instances, 1);
    assert_eq!(sink.metrics()[0].meta.device_id, HOST);
}

#[tokio::test]
async fn test_bad_reading_does_not_abort_batch() {
    let items = vec![
        bits_in("8001", "n/a"),
        MetricItem {
            units: "bps".to_string(),
            ..item("8002", "Interface Gi0/3: Bits sent", "net.if.out[ifHCOutOctets.3]", "2000")
        },
    ];
    let source = MockSource::default()
        .with_device(HOST, items)
        .with_history("8002", &[("2000", "130"), ("1000", "100")]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    let report = orch.run_cycle().await;

    assert_eq!(report.unavailable(RateUnavailable::InvalidSample), 1);
    assert_eq!(report.rates_computed, 1);
    assert_eq!(report.metrics_emitted, 2);
    assert!(orch.cache().get("8001").is_none());

    let raw = sink
        .metrics()
        .into_iter()
        .find(|m| m.metric == "net.if.in[ifHCInOctets.3]")
        .unwrap();
    assert_eq!(raw.value, serde_json::json!("n/a"));
}

#[tokio::test]
async fn test_hosts_discovered_once_by_default() {
    let source = Arc::new(MockSource::default().with_device(HOST, vec![bits_in("9001", "1")]));
    let mut orch = CycleOrchestratorBuilder::new()
        .source(source.clone())
        .build()
        .unwrap();

    orch.run_cycle().await;
    let report = orch.run_cycle().await;

    assert_eq!(report.cycle, 2);
    assert_eq!(report.devices, 1);
    assert_eq!(source.discover_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_hosts_refreshed_when_configured() {
    let source = Arc::new(MockSource::default().with_device(HOST, vec![]));
    let mut orch = CycleOrchestratorBuilder::new()
        .source(source.clone())
        .profile(PipelineProfile {
            refresh_hosts_every_cycle: true,
            ..Default::default()
        })
        .build()
        .unwrap();

    orch.run_cycle().await;
    orch.run_cycle().await;

    assert_eq!(source.discover_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_monitoring_server_skipped() {
    let source = MockSource::default()
        .with_device("Zabbix server", vec![bits_in("9101", "1")])
        .with_device(HOST, vec![]);
    let mut orch = CycleOrchestratorBuilder::new()
        .source(Arc::new(source))
        .build()
        .unwrap();

    let report = orch.run_cycle().await;
    assert_eq!(report.devices, 1);
    assert_eq!(report.instances, 0);
}

#[tokio::test]
async fn test_inventory_type_overrides_host_name() {
    let source = MockSource::default()
        .with_typed_device("server-room-sw-01", Some("switch"), vec![bits_in("9201", "1")])
        .with_typed_device("nms-01", Some("Linux server"), vec![bits_in("9202", "1")])
        .with_device(HOST, vec![]);
    let sink = Arc::new(RecordingSink::default());
    let mut orch = orchestrator(source, sink.clone());

    let report = orch.run_cycle().await;

    assert_eq!(report.devices, 2);
    assert_eq!(report.instances, 1);
    assert_eq!(sink.metrics()[0].meta.device_id, "server-room-sw-01");
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let source = MockSource::default().with_device(HOST, vec![]);
    let orch = CycleOrchestratorBuilder::new()
        .source(Arc::new(source))
        .poll_interval(std::time::Duration::from_secs(3600))
        .build()
        .unwrap();

    let (tx, rx) = tokio::sync::broadcast::channel(1);
    let handle = tokio::spawn(orch.run(rx));
    tx.send(()).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
}

#[test]
fn test_builder_requires_source() {
    assert!(CycleOrchestratorBuilder::new().build().is_err());
}

#[test]
fn test_rate_from_history() {
    let samples = |pairs: &[(&str, &str)]| -> Vec<HistorySample> {
        pairs
            .iter()
            .map(|(v, c)| HistorySample {
                value: v.to_string(),
                clock: c.to_string(),
            })
            .collect()
    };

    let rate = rate_from_history(&samples(&[("1500", "130"), ("1000", "100")]), CounterWidth::Bits64).unwrap();
    assert!((rate - 16.666_666_666).abs() < 1e-6);

    assert_eq!(
        rate_from_history(&samples(&[("1500", "130")]), CounterWidth::Bits64),
        Err(RateUnavailable::NoBaseline)
    );
    assert_eq!(
        rate_from_history(&samples(&[("oops", "130"), ("1000", "100")]), CounterWidth::Bits64),
        Err(RateUnavailable::InvalidSample)
    );
    assert_eq!(
        rate_from_history(&samples(&[("1000", "100"), ("1500", "130")]), CounterWidth::Bits64),
        Err(RateUnavailable::NonCausalInterval)
    );
}
