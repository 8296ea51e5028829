//! HTTP client for the ingestion service query API

use anyhow::{Context, Result};
use netmon_lib::models::{EventRecord, MetricRecord};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// Client for the ingestion service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

/// `{"count": n, "data": [...]}` envelope returned by listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub count: usize,
    pub data: Vec<T>,
}

/// Parameters of a time-range metric query
#[derive(Debug, Clone, Serialize)]
pub struct MetricsQuery<'a> {
    pub device_id: &'a str,
    pub metric: &'a str,
    pub start_ts: i64,
    pub end_ts: i64,
    pub limit: usize,
}

#[derive(Serialize)]
struct EventsQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
    limit: usize,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// GET `path` with URL-encoded query parameters
    pub async fn get<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn metrics(&self, query: &MetricsQuery<'_>) -> Result<Listing<MetricRecord>> {
        self.get("metrics", query).await
    }

    pub async fn events(&self, device_id: Option<&str>, limit: usize) -> Result<Listing<EventRecord>> {
        self.get("events", &EventsQuery { device_id, limit }).await
    }
}
