//! Retention-bounded record store
//!
//! Records live in memory behind a tokio `RwLock`. When a snapshot path is
//! configured the whole store is loaded from it at startup and rewritten
//! atomically after each prune.

use anyhow::{Context, Result};
use netmon_lib::models::{EventRecord, MetricRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default page size for metric queries
pub const DEFAULT_METRICS_LIMIT: usize = 1000;

/// Default page size for event listings
pub const DEFAULT_EVENTS_LIMIT: usize = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    metrics: Vec<MetricRecord>,
    events: Vec<EventRecord>,
}

/// Time-range query over stored metrics; both bounds are inclusive
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricQuery {
    pub device_id: String,
    pub metric: String,
    pub start_ts: i64,
    pub end_ts: i64,
    #[serde(default = "default_metrics_limit")]
    pub limit: usize,
}

fn default_metrics_limit() -> usize {
    DEFAULT_METRICS_LIMIT
}

/// Records removed by one prune pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub metrics: usize,
    pub events: usize,
}

/// In-memory store with an optional JSON snapshot
#[derive(Debug, Default)]
pub struct RecordStore {
    data: RwLock<StoreData>,
    snapshot: Option<PathBuf>,
}

impl RecordStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, starting empty if the snapshot is
    /// missing or unreadable
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match read_snapshot(&path).await {
            Ok(Some(data)) => {
                info!(
                    path = %path.display(),
                    metrics = data.metrics.len(),
                    events = data.events.len(),
                    "Loaded store snapshot"
                );
                data
            }
            Ok(None) => {
                info!(path = %path.display(), "No store snapshot found, starting empty");
                StoreData::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load store snapshot, starting empty");
                StoreData::default()
            }
        };

        Self {
            data: RwLock::new(data),
            snapshot: Some(path),
        }
    }

    pub async fn insert_metrics(&self, records: Vec<MetricRecord>) -> usize {
        let inserted = records.len();
        self.data.write().await.metrics.extend(records);
        inserted
    }

    pub async fn insert_events(&self, records: Vec<EventRecord>) -> usize {
        let inserted = records.len();
        self.data.write().await.events.extend(records);
        inserted
    }

    /// Metrics of one device and metric name within the range, oldest first
    pub async fn query_metrics(&self, query: &MetricQuery) -> Vec<MetricRecord> {
        let data = self.data.read().await;
        let mut matched: Vec<MetricRecord> = data
            .metrics
            .iter()
            .filter(|m| {
                m.meta.device_id == query.device_id
                    && m.metric == query.metric
                    && m.ts >= query.start_ts
                    && m.ts <= query.end_ts
            })
            .cloned()
            .collect();

        matched.sort_by_key(|m| m.ts);
        matched.truncate(query.limit);
        matched
    }

    /// Most recent events first, optionally for one device only
    pub async fn recent_events(&self, device_id: Option<&str>, limit: usize) -> Vec<EventRecord> {
        let data = self.data.read().await;
        let mut matched: Vec<EventRecord> = data
            .events
            .iter()
            .filter(|e| device_id.map_or(true, |d| e.device_id == d))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        matched.truncate(limit);
        matched
    }

    /// Drop metrics with `ts` and events with `detected_at` before `cutoff`
    pub async fn prune(&self, cutoff: i64) -> PruneOutcome {
        let mut data = self.data.write().await;

        let metrics_before = data.metrics.len();
        data.metrics.retain(|m| m.ts >= cutoff);
        let events_before = data.events.len();
        data.events.retain(|e| e.detected_at >= cutoff);

        let outcome = PruneOutcome {
            metrics: metrics_before - data.metrics.len(),
            events: events_before - data.events.len(),
        };
        debug!(
            cutoff = cutoff,
            metrics_removed = outcome.metrics,
            events_removed = outcome.events,
            "Pruned store"
        );
        outcome
    }

    /// Rewrite the snapshot file, if one is configured
    pub async fn save_snapshot(&self) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let json = {
            let data = self.data.read().await;
            serde_json::to_vec(&*data).context("Failed to serialize store")?
        };
        write_snapshot(path, &json).await
    }

    /// `(metrics, events)` currently held
    pub async fn counts(&self) -> (usize, usize) {
        let data = self.data.read().await;
        (data.metrics.len(), data.events.len())
    }
}

async fn read_snapshot(path: &Path) -> Result<Option<StoreData>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let data = serde_json::from_slice(&bytes).context("Failed to deserialize store snapshot")?;
            Ok(Some(data))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read snapshot {:?}", path)),
    }
}

/// Write atomically via a temp file and rename
async fn write_snapshot(path: &Path, json: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

    file.write_all(json).await.context("Failed to write snapshot")?;
    file.sync_all().await.context("Failed to sync snapshot")?;

    tokio::fs::rename(&temp_path, path)
        .await
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    debug!(path = %path.display(), bytes = json.len(), "Store snapshot written");
    Ok(())
}
