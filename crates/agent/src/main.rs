//! NetMon Agent - Zabbix interface polling agent
//!
//! Runs the poll cycle loop and serves health and Prometheus metrics
//! endpoints until interrupted.

use anyhow::{Context, Result};
use netmon_agent::{api, config::AgentConfig};
use netmon_lib::{
    cache::CounterCache,
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    pipeline::CycleOrchestratorBuilder,
    sink::HttpIngestClient,
    source::ZabbixClient,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting netmon-agent");

    let config = AgentConfig::load()?;
    info!(
        agent_id = %config.agent_id,
        poll_interval_secs = config.poll_interval_secs,
        cache_file = %config.cache_file.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SOURCE).await;
    health_registry.register(components::ORCHESTRATOR).await;
    health_registry.register(components::INGEST).await;
    health_registry.register(components::CACHE).await;

    let metrics = AgentMetrics::new();

    let logger = StructuredLogger::new(&config.agent_id);
    logger.log_startup(AGENT_VERSION, &config.api_url, config.backend_url.as_deref());

    let source = ZabbixClient::new(config.zabbix_config()).context("Failed to create Zabbix client")?;
    match source.api_version().await {
        Ok(version) => info!(api_version = %version, "Connected to Zabbix API"),
        Err(e) => warn!(error = %e, "Zabbix API not reachable yet, continuing"),
    }

    let cache = CounterCache::load(&config.cache_file, config.cache_max_entries);
    metrics.set_cache_entries(cache.len());

    let mut builder = CycleOrchestratorBuilder::new()
        .source(Arc::new(source))
        .cache(cache)
        .poll_interval(config.poll_interval())
        .profile(config.profile)
        .thresholds(config.thresholds)
        .health(health_registry.clone())
        .agent_id(config.agent_id.clone());

    match config.ingest_config() {
        Some(ingest) => {
            let sink = HttpIngestClient::new(ingest).context("Failed to create ingestion client")?;
            info!(
                metrics_url = %sink.metrics_url(),
                events_url = %sink.events_url(),
                "Ingestion backend configured"
            );
            builder = builder.sink(Arc::new(sink));
        }
        None => warn!("NETMON_BACKEND_URL not set, records will not be delivered"),
    }

    let orchestrator = builder.build()?;

    let app_state = Arc::new(
        api::AppState::new(health_registry.clone(), metrics.clone())
            .with_stale_after(config.poll_interval() * 3),
    );
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(orchestrator.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    // The loop finishes its current cycle, including the cache flush
    let _ = shutdown_tx.send(());
    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Poll loop task failed");
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
