//! Observability infrastructure for the polling agent
//!
//! Provides:
//! - Prometheus metrics (cycle latency, polled instances, rate outcomes, events, transport failures)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for poll cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_completed: IntCounter,
    devices_polled: IntGauge,
    instances_polled: IntGauge,
    rates_computed: IntCounter,
    rates_unavailable: IntCounterVec,
    events_emitted: IntCounterVec,
    transport_failures: IntCounterVec,
    source_errors: IntCounter,
    cache_entries: IntGauge,
    cache_write_failures: IntCounter,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "netmon_agent_cycle_duration_seconds",
                "Wall time of one full poll cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_completed: register_int_counter!(
                "netmon_agent_cycles_completed_total",
                "Number of completed poll cycles"
            )
            .expect("Failed to register cycles_completed"),

            devices_polled: register_int_gauge!(
                "netmon_agent_devices_polled",
                "Devices polled in the last cycle"
            )
            .expect("Failed to register devices_polled"),

            instances_polled: register_int_gauge!(
                "netmon_agent_instances_polled",
                "Metric instances processed in the last cycle"
            )
            .expect("Failed to register instances_polled"),

            rates_computed: register_int_counter!(
                "netmon_agent_rates_computed_total",
                "Traffic rates successfully derived from counters"
            )
            .expect("Failed to register rates_computed"),

            rates_unavailable: register_int_counter_vec!(
                "netmon_agent_rates_unavailable_total",
                "Traffic rates that could not be derived, by reason",
                &["reason"]
            )
            .expect("Failed to register rates_unavailable"),

            events_emitted: register_int_counter_vec!(
                "netmon_agent_events_emitted_total",
                "Anomaly events emitted, by severity",
                &["severity"]
            )
            .expect("Failed to register events_emitted"),

            transport_failures: register_int_counter_vec!(
                "netmon_agent_transport_failures_total",
                "Batches that could not be delivered to the ingestion backend",
                &["batch"]
            )
            .expect("Failed to register transport_failures"),

            source_errors: register_int_counter!(
                "netmon_agent_source_errors_total",
                "Failed calls to the monitoring platform API"
            )
            .expect("Failed to register source_errors"),

            cache_entries: register_int_gauge!(
                "netmon_agent_cache_entries",
                "Instances tracked in the counter cache"
            )
            .expect("Failed to register cache_entries"),

            cache_write_failures: register_int_counter!(
                "netmon_agent_cache_write_failures_total",
                "Failed attempts to persist the counter cache"
            )
            .expect("Failed to register cache_write_failures"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle(&self, duration_secs: f64, devices: usize, instances: usize) {
        let inner = self.inner();
        inner.cycle_duration_seconds.observe(duration_secs);
        inner.cycles_completed.inc();
        inner.devices_polled.set(devices as i64);
        inner.instances_polled.set(instances as i64);
    }

    pub fn inc_rates_computed(&self) {
        self.inner().rates_computed.inc();
    }

    pub fn inc_rate_unavailable(&self, reason: &str) {
        self.inner().rates_unavailable.with_label_values(&[reason]).inc();
    }

    pub fn inc_events_emitted(&self, severity: &str) {
        self.inner().events_emitted.with_label_values(&[severity]).inc();
    }

    pub fn inc_transport_failures(&self, batch: &str) {
        self.inner().transport_failures.with_label_values(&[batch]).inc();
    }

    pub fn inc_source_errors(&self) {
        self.inner().source_errors.inc();
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.inner().cache_entries.set(entries as i64);
    }

    pub fn inc_cache_write_failures(&self) {
        self.inner().cache_write_failures.inc();
    }
}

/// Structured logger for agent events
///
/// Keeps field names consistent across cycle, event and failure logs.
#[derive(Clone)]
pub struct StructuredLogger {
    agent_id: String,
}

impl StructuredLogger {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }

    pub fn log_startup(&self, version: &str, source_url: &str, backend_url: Option<&str>) {
        info!(
            event = "agent_started",
            agent = %self.agent_id,
            agent_version = %version,
            source_url = %source_url,
            backend_url = ?backend_url,
            "Network polling agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            agent = %self.agent_id,
            reason = %reason,
            "Network polling agent shutting down"
        );
    }

    /// Log one instance's outcome
    pub fn log_instance(
        &self,
        device: &str,
        iface: &str,
        metric: &str,
        raw_value: &str,
        rate_bps: Option<f64>,
        status: &str,
    ) {
        tracing::debug!(
            event = "instance_polled",
            agent = %self.agent_id,
            device = %device,
            iface = %iface,
            metric = %metric,
            value = %raw_value,
            rate_bps = ?rate_bps,
            status = %status,
            "Instance polled"
        );
    }

    pub fn log_event(&self, device: &str, iface: &str, metric: &str, status: &str, severity: &str) {
        match severity {
            "critical" => {
                warn!(
                    event = "anomaly_detected",
                    agent = %self.agent_id,
                    device = %device,
                    iface = %iface,
                    metric = %metric,
                    status = %status,
                    severity = %severity,
                    "Critical interface anomaly"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    agent = %self.agent_id,
                    device = %device,
                    iface = %iface,
                    metric = %metric,
                    status = %status,
                    severity = %severity,
                    "Interface anomaly"
                );
            }
        }
    }

    pub fn log_cycle_complete(
        &self,
        cycle: u64,
        devices: usize,
        metrics: usize,
        events: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "cycle_complete",
            agent = %self.agent_id,
            cycle = cycle,
            devices = devices,
            metrics = metrics,
            events = events,
            elapsed_ms = elapsed_ms as u64,
            "Poll cycle complete"
        );
    }

    pub fn log_transport_failure(&self, batch: &str, records: usize, error: &str) {
        error!(
            event = "transport_failed",
            agent = %self.agent_id,
            batch = %batch,
            records = records,
            error = %error,
            "Failed to deliver batch to ingestion backend"
        );
    }

    pub fn log_source_failure(&self, operation: &str, device: Option<&str>, error: &str) {
        warn!(
            event = "source_failed",
            agent = %self.agent_id,
            operation = %operation,
            device = ?device,
            error = %error,
            "Monitoring API call failed"
        );
    }

    pub fn log_cache_failure(&self, path: &str, error: &str) {
        warn!(
            event = "cache_write_failed",
            agent = %self.agent_id,
            path = %path,
            error = %error,
            "Failed to persist counter cache"
        );
    }
}
