//! HTTP client for the ingestion service
//!
//! Posts JSON arrays to `{base}/ingest/metrics` and `{base}/ingest/events`.
//! Any non-2xx answer counts as a transport failure and is retried.

use super::{async_trait, IngestSink, RetryPolicy};
use crate::error::IngestError;
use crate::models::{EventRecord, MetricRecord};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Configuration for the ingestion client
#[derive(Debug, Clone)]
pub struct IngestClientConfig {
    /// Base URL of the ingestion service (e.g. "http://localhost:8000")
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for IngestClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(8),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Deserialize)]
struct InsertResponse {
    inserted: usize,
}

/// Ingestion client implementing [`IngestSink`]
pub struct HttpIngestClient {
    client: Client,
    metrics_url: Url,
    events_url: Url,
    retry: RetryPolicy,
}

impl HttpIngestClient {
    pub fn new(config: IngestClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let base = Url::parse(&base).context("Invalid ingestion backend URL")?;

        Ok(Self {
            client,
            metrics_url: base.join("ingest/metrics").context("Invalid metrics path")?,
            events_url: base.join("ingest/events").context("Invalid events path")?,
            retry: config.retry,
        })
    }

    pub fn metrics_url(&self) -> &Url {
        &self.metrics_url
    }

    pub fn events_url(&self) -> &Url {
        &self.events_url
    }

    async fn post_batch<T: Serialize + Sync>(&self, url: &Url, batch: &[T]) -> Result<usize, IngestError> {
        let result = self
            .retry
            .run(url.as_str(), |attempt| {
                let request = self.client.post(url.clone()).json(batch);
                let url = url.to_string();
                async move {
                    debug!(url = %url, attempt = attempt, records = batch.len(), "Posting batch");

                    let response = request.send().await.map_err(|source| IngestError::Transport {
                        url: url.clone(),
                        source,
                    })?;

                    let status = response.status();
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(IngestError::Status {
                            url,
                            status: status.as_u16(),
                            body,
                        });
                    }

                    // Older backends answer without a body; count what we sent
                    let inserted = response
                        .json::<InsertResponse>()
                        .await
                        .map(|r| r.inserted)
                        .unwrap_or(batch.len());
                    Ok::<usize, IngestError>(inserted)
                }
            })
            .await;

        result.map_err(|(e, attempts)| IngestError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last_error: e.to_string(),
        })
    }
}

#[async_trait]
impl IngestSink for HttpIngestClient {
    async fn send_metrics(&self, metrics: &[MetricRecord]) -> Result<usize, IngestError> {
        self.post_batch(&self.metrics_url, metrics).await
    }

    async fn send_events(&self, events: &[EventRecord]) -> Result<usize, IngestError> {
        self.post_batch(&self.events_url, events).await
    }
}
