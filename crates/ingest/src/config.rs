//! Ingestion service configuration

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, read from `INGEST_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Snapshot file; unset keeps records in memory only
    #[serde(default)]
    pub data_file: Option<PathBuf>,

    /// Age after which records are pruned
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

fn default_port() -> u16 {
    8000
}

fn default_retention() -> u64 {
    7 * 24 * 3600
}

fn default_prune_interval() -> u64 {
    3600
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_file: None,
            retention_secs: default_retention(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

impl IngestConfig {
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("INGEST"))
            .build()
            .context("Failed to read ingest configuration")?;

        let parsed: Self = config
            .try_deserialize()
            .context("Invalid ingest configuration")?;
        if parsed.prune_interval_secs == 0 {
            bail!("INGEST_PRUNE_INTERVAL_SECS must be positive");
        }
        Ok(parsed)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}
