//! NetMon Ingest - storage and query service for agent batches

use anyhow::Result;
use netmon_ingest::{api, config::IngestConfig, store::RecordStore};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Periodically drop records older than the retention window
async fn prune_loop(
    store: Arc<RecordStore>,
    config: IngestConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let retention = config.retention().as_secs() as i64;
    let mut ticker = tokio::time::interval(config.prune_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let cutoff = chrono::Utc::now().timestamp() - retention;
                let outcome = store.prune(cutoff).await;
                if outcome.metrics + outcome.events > 0 {
                    info!(
                        metrics_removed = outcome.metrics,
                        events_removed = outcome.events,
                        "Retention prune"
                    );
                }
                if let Err(e) = store.save_snapshot().await {
                    warn!(error = %format!("{:#}", e), "Failed to write store snapshot");
                }
            }
            _ = shutdown.recv() => {
                info!("Stopping retention task");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = IngestConfig::load()?;
    info!(
        port = config.port,
        retention_secs = config.retention_secs,
        data_file = ?config.data_file,
        "Starting netmon-ingest"
    );

    let store = Arc::new(match &config.data_file {
        Some(path) => RecordStore::open(path).await,
        None => RecordStore::in_memory(),
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let prune_handle = tokio::spawn(prune_loop(store.clone(), config.clone(), shutdown_rx));

    let state = Arc::new(api::AppState::new(store.clone()));
    let api_handle = tokio::spawn(api::serve(config.port, state));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let _ = shutdown_tx.send(());
    let _ = prune_handle.await;
    api_handle.abort();

    if let Err(e) = store.save_snapshot().await {
        warn!(error = %format!("{:#}", e), "Failed to write final store snapshot");
    }

    Ok(())
}
