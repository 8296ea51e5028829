//! The poll cycle loop

use super::{rate_from_history, CycleReport, CycleState, OrchestratorConfig, PipelineProfile};
use crate::cache::{CounterCache, DEFAULT_MAX_ENTRIES};
use crate::classify::{ClassifierThresholds, Status, StatusClassifier};
use crate::error::SourceError;
use crate::health::{components, ComponentHealth, HealthRegistry};
use crate::interface::{bits_multiplier, group_items, is_traffic_item, value_kind, InterfaceGroup};
use crate::models::{
    json_value, Device, EventRecord, Evidence, MetricItem, MetricMeta, MetricRecord,
};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::rate::{
    check_link_capacity, compute_rate, parse_counter_value, CounterWidth, RateResult,
    RateUnavailable,
};
use crate::sink::IngestSink;
use crate::source::InventorySource;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

/// Records accumulated over one cycle, transmitted only once the cycle is computed
#[derive(Debug, Default)]
struct CycleBatch {
    metrics: Vec<MetricRecord>,
    events: Vec<EventRecord>,
}

/// Drives poll cycles against an inventory source and an ingestion sink
pub struct CycleOrchestrator {
    source: Arc<dyn InventorySource>,
    /// `None` runs the pipeline without delivering anything
    sink: Option<Arc<dyn IngestSink>>,
    cache: CounterCache,
    classifier: StatusClassifier,
    config: OrchestratorConfig,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    clock: fn() -> i64,
    state: CycleState,
    known_devices: Option<Vec<Device>>,
    cycles: u64,
}

impl CycleOrchestrator {
    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn cache(&self) -> &CounterCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CounterCache {
        &mut self.cache
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// Shutdown is observed between cycles only; a cycle in progress always
    /// completes, including its cache flush.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            discovery = ?self.config.profile.discovery,
            item_filter = ?self.config.profile.item_filter,
            "Starting poll cycle loop"
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.recv() => {
                    info!(cycles = self.cycles, "Shutting down poll cycle loop");
                    break;
                }
            }
        }
    }

    /// Execute one full poll cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        self.cycles += 1;
        self.state = CycleState::Collecting;

        let mut report = CycleReport {
            cycle: self.cycles,
            ts: (self.clock)(),
            ..Default::default()
        };
        let mut batch = CycleBatch::default();

        match self.devices().await {
            Ok(devices) => {
                self.mark(components::SOURCE, ComponentHealth::healthy()).await;
                report.devices = devices.len();
                for device in &devices {
                    self.poll_device(device, &mut batch, &mut report).await;
                }
            }
            Err(e) => {
                report.source_errors += 1;
                self.metrics.inc_source_errors();
                self.logger.log_source_failure("discover_devices", None, &e.to_string());
                self.mark(components::SOURCE, ComponentHealth::unhealthy(e.to_string()))
                    .await;
            }
        }

        self.state = CycleState::Flushing;
        report.metrics_emitted = batch.metrics.len();
        report.events_emitted = batch.events.len();
        self.deliver(&batch, &mut report).await;
        self.persist_cache(&mut report).await;
        self.state = CycleState::Idle;

        report.elapsed = started.elapsed();
        self.metrics
            .observe_cycle(report.elapsed.as_secs_f64(), report.devices, report.instances);
        self.logger.log_cycle_complete(
            report.cycle,
            report.devices,
            report.metrics_emitted,
            report.events_emitted,
            report.elapsed.as_millis(),
        );
        if let Some(health) = &self.health {
            health.set_healthy(components::ORCHESTRATOR).await;
            health.record_cycle(report.ts).await;
        }

        report
    }

    /// Devices to poll this cycle, discovering them when needed
    async fn devices(&mut self) -> Result<Vec<Device>, SourceError> {
        let refresh = self.config.profile.refresh_hosts_every_cycle;
        if !refresh {
            if let Some(known) = &self.known_devices {
                return Ok(known.clone());
            }
        }

        let scope = self.config.profile.discovery;
        let devices: Vec<Device> = self
            .source
            .discover_devices()
            .await?
            .into_iter()
            .filter(|d| scope.accepts(d))
            .collect();

        info!(devices = devices.len(), scope = ?scope, "Discovered devices");
        if !refresh {
            self.known_devices = Some(devices.clone());
        }
        Ok(devices)
    }

    async fn poll_device(&mut self, device: &Device, batch: &mut CycleBatch, report: &mut CycleReport) {
        let items = match self.source.items_for(device).await {
            Ok(items) => items,
            Err(e) => {
                report.source_errors += 1;
                self.metrics.inc_source_errors();
                self.logger
                    .log_source_failure("items_for", Some(&device.host), &e.to_string());
                return;
            }
        };

        let total = items.len();
        let groups = group_items(items, self.config.profile.item_filter);
        debug!(
            device = %device.host,
            items = total,
            interfaces = groups.len(),
            "Grouped device items"
        );

        for group in &groups {
            for item in &group.items {
                self.poll_item(device, group, item, batch, report).await;
            }
        }
    }

    async fn poll_item(
        &mut self,
        device: &Device,
        group: &InterfaceGroup,
        item: &MetricItem,
        batch: &mut CycleBatch,
        report: &mut CycleReport,
    ) {
        report.instances += 1;
        let ts = report.ts;

        let rate_bps = if is_traffic_item(item) {
            match self.traffic_rate(item, group, ts).await {
                Ok(rate) => {
                    report.rates_computed += 1;
                    self.metrics.inc_rates_computed();
                    Some(rate)
                }
                Err(reason) => {
                    report.record_unavailable(reason);
                    self.metrics.inc_rate_unavailable(reason.as_label());
                    debug!(
                        device = %device.host,
                        item = %item.id,
                        reason = %reason,
                        "No rate for traffic item"
                    );
                    None
                }
            }
        } else {
            None
        };

        let classification =
            self.classifier
                .classify(rate_bps, group.link_capacity_bps, group.oper_up);
        let metric = metric_name(item).to_string();
        let raw_value = item.last_value.as_deref();

        self.logger.log_instance(
            &device.host,
            &group.label,
            &metric,
            raw_value.unwrap_or(""),
            rate_bps,
            &classification.status.to_string(),
        );

        batch.metrics.push(MetricRecord {
            ts,
            meta: MetricMeta {
                device_id: device.host.clone(),
                hostid: Some(device.hostid.clone()),
                ifindex: group.ifindex().map(str::to_string),
                ifdescr: (!group.is_global()).then(|| group.label.clone()),
                location: device.location.clone(),
                extra: Default::default(),
            },
            metric: metric.clone(),
            value: raw_value.map(json_value).unwrap_or(serde_json::Value::Null),
            value_type: value_kind(item),
        });

        if !self.should_emit_event(&classification.status) {
            return;
        }

        let severity = classification.severity;
        let status = classification.status.to_string();
        self.logger
            .log_event(&device.host, &group.label, &metric, &status, severity.as_str());
        self.metrics.inc_events_emitted(severity.as_str());

        batch.events.push(EventRecord {
            device_id: device.host.clone(),
            hostid: Some(device.hostid.clone()),
            iface: Some(group.label.clone()),
            metric,
            value: raw_value.map(|v| serde_json::Value::String(v.to_string())),
            status,
            severity,
            detected_at: ts,
            evidence: Some(Evidence {
                rate_bps,
                link_speed_bps: group.link_capacity_bps,
            }),
            labels: classification.labels,
        });
    }

    fn should_emit_event(&self, status: &Status) -> bool {
        match status {
            Status::Ok => false,
            Status::NoData => self.config.profile.emit_idle_events,
            Status::LinkDown | Status::HighBandwidth { .. } => true,
        }
    }

    /// Bits-per-second rate for one traffic item.
    ///
    /// History is tried first; the cache entry against the current reading is
    /// the fallback. The current reading always replaces the cache entry.
    async fn traffic_rate(&mut self, item: &MetricItem, group: &InterfaceGroup, ts: i64) -> RateResult {
        let width = CounterWidth::resolve(item.declared_width, &item.key);

        let from_history = match self.source.history_last_two(item).await {
            Ok(samples) => rate_from_history(&samples, width),
            Err(e) => {
                debug!(item = %item.id, error = %e, "History unavailable, using counter cache");
                Err(RateUnavailable::NoBaseline)
            }
        };

        let current = item
            .last_value
            .as_deref()
            .map(parse_counter_value)
            .transpose()
            .ok()
            .flatten();

        let previous = self.cache.get(&item.id).copied();
        if let Some(value) = current {
            self.cache.put(item.id.clone(), value, ts);
        }

        let native = from_history.or_else(|_| match (current, previous) {
            (None, _) => Err(RateUnavailable::InvalidSample),
            (Some(_), None) => Err(RateUnavailable::NoBaseline),
            (Some(value), Some(prev)) => compute_rate(prev.value, prev.ts, value, ts, width),
        })?;

        check_link_capacity(native * bits_multiplier(item), group.link_capacity_bps)
    }

    async fn deliver(&self, batch: &CycleBatch, report: &mut CycleReport) {
        let Some(sink) = &self.sink else {
            debug!(
                metrics = batch.metrics.len(),
                events = batch.events.len(),
                "No ingestion backend configured, dropping batch"
            );
            return;
        };

        let mut failures = Vec::new();

        if !batch.metrics.is_empty() {
            match sink.send_metrics(&batch.metrics).await {
                Ok(inserted) => debug!(inserted = inserted, "Metrics batch delivered"),
                Err(e) => {
                    self.metrics.inc_transport_failures("metrics");
                    self.logger
                        .log_transport_failure("metrics", batch.metrics.len(), &e.to_string());
                    failures.push("metrics");
                }
            }
        }

        if !batch.events.is_empty() {
            match sink.send_events(&batch.events).await {
                Ok(inserted) => debug!(inserted = inserted, "Events batch delivered"),
                Err(e) => {
                    self.metrics.inc_transport_failures("events");
                    self.logger
                        .log_transport_failure("events", batch.events.len(), &e.to_string());
                    failures.push("events");
                }
            }
        }

        report.transport_failures = failures.len();
        let health = if failures.is_empty() {
            ComponentHealth::healthy()
        } else {
            ComponentHealth::degraded(format!("undelivered batches: {}", failures.join(", ")))
        };
        self.mark(components::INGEST, health).await;
    }

    async fn persist_cache(&mut self, report: &mut CycleReport) {
        match self.cache.flush() {
            Ok(()) => {
                report.cache_persisted = self.cache.path().is_some();
                self.mark(components::CACHE, ComponentHealth::healthy()).await;
            }
            Err(e) => {
                let path = self
                    .cache
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                self.metrics.inc_cache_write_failures();
                self.logger.log_cache_failure(&path, &format!("{:#}", e));
                self.mark(components::CACHE, ComponentHealth::degraded(e.to_string()))
                    .await;
            }
        }
        self.metrics.set_cache_entries(self.cache.len());
    }

    async fn mark(&self, component: &str, health: ComponentHealth) {
        if let Some(registry) = &self.health {
            registry.update(component, health).await;
        }
    }
}

/// Metric identifier sent downstream: the item key, or its name when keyless
fn metric_name(item: &MetricItem) -> &str {
    if item.key.is_empty() {
        &item.name
    } else {
        &item.key
    }
}

fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Builder for [`CycleOrchestrator`]
pub struct CycleOrchestratorBuilder {
    source: Option<Arc<dyn InventorySource>>,
    sink: Option<Arc<dyn IngestSink>>,
    cache: Option<CounterCache>,
    config: OrchestratorConfig,
    health: Option<HealthRegistry>,
    agent_id: String,
    clock: fn() -> i64,
}

impl CycleOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            sink: None,
            cache: None,
            config: OrchestratorConfig::default(),
            health: None,
            agent_id: "netmon-agent".to_string(),
            clock: system_clock,
        }
    }

    pub fn source(mut self, source: Arc<dyn InventorySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn IngestSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn cache(mut self, cache: CounterCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn profile(mut self, profile: PipelineProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn thresholds(mut self, thresholds: ClassifierThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Override the cycle timestamp source (seconds since the epoch)
    pub fn clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<CycleOrchestrator> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Inventory source is required"))?;

        Ok(CycleOrchestrator {
            source,
            sink: self.sink,
            cache: self
                .cache
                .unwrap_or_else(|| CounterCache::in_memory(DEFAULT_MAX_ENTRIES)),
            classifier: StatusClassifier::new(self.config.thresholds),
            config: self.config,
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new(self.agent_id),
            health: self.health,
            clock: self.clock,
            state: CycleState::Idle,
            known_devices: None,
            cycles: 0,
        })
    }
}

impl Default for CycleOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
