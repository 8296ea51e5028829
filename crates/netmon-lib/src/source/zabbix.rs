//! Zabbix JSON-RPC client
//!
//! Reads hosts, items and item history with a bearer API token. Every call
//! is a single blocking-in-sequence request; a JSON-RPC error object is
//! reported as a [`SourceError::Rpc`].

use super::{async_trait, InventorySource};
use crate::error::SourceError;
use crate::models::{Device, HistorySample, MetricItem};
use crate::rate::CounterWidth;
use anyhow::{Context, Result};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Maximum items fetched per host
const ITEM_LIMIT: u32 = 5000;

/// Configuration for the Zabbix client
#[derive(Debug, Clone)]
pub struct ZabbixConfig {
    /// JSON-RPC endpoint, e.g. "http://zabbix/zabbix/api_jsonrpc.php"
    pub url: String,
    /// API token sent as a bearer credential
    pub api_token: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for ZabbixConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost/zabbix/api_jsonrpc.php".to_string(),
            api_token: String::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Zabbix API client implementing [`InventorySource`]
pub struct ZabbixClient {
    client: Client,
    url: Url,
    api_token: String,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
struct RawHost {
    hostid: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    name: String,
    /// An object when inventory is enabled, an empty array otherwise
    #[serde(default)]
    inventory: Value,
}

#[derive(Deserialize)]
struct RawItem {
    itemid: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    key_: String,
    #[serde(default)]
    value_type: String,
    #[serde(default)]
    units: String,
    #[serde(default)]
    lastvalue: Option<String>,
    #[serde(default)]
    snmp_oid: Option<String>,
}

impl From<RawHost> for Device {
    fn from(raw: RawHost) -> Self {
        let inventory_field = |field: &str| -> Option<String> {
            raw.inventory
                .get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let location = inventory_field("location");
        let inventory_type = inventory_field("type");

        Device {
            hostid: raw.hostid,
            host: raw.host,
            name: raw.name,
            location,
            inventory_type,
        }
    }
}

impl From<RawItem> for MetricItem {
    fn from(raw: RawItem) -> Self {
        let declared_width = raw.snmp_oid.as_deref().and_then(CounterWidth::from_snmp_oid);
        MetricItem {
            id: raw.itemid,
            name: raw.name,
            key: raw.key_,
            last_value: raw.lastvalue,
            // Zabbix defaults to numeric unsigned history
            value_type: raw.value_type.parse().unwrap_or(3),
            units: raw.units,
            declared_width,
        }
    }
}

impl ZabbixClient {
    pub fn new(config: ZabbixConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let url = Url::parse(&config.url).context("Invalid Zabbix API URL")?;

        Ok(Self {
            client,
            url,
            api_token: config.api_token,
            next_id: AtomicU64::new(1),
        })
    }

    /// Perform one JSON-RPC call and decode its `result`
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, SourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        debug!(method = %method, id = id, "Zabbix API call");

        let http_err = |source| SourceError::Http {
            method: method.to_string(),
            source,
        };

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json-rpc")
            .header(AUTHORIZATION, format!("Bearer {}", self.api_token))
            .body(payload.to_string())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;

        let body: RpcResponse = response.json().await.map_err(http_err)?;

        if let Some(err) = body.error {
            let message = match err.data {
                Some(data) if !data.is_empty() => format!("{} ({})", err.message, data),
                _ => err.message,
            };
            return Err(SourceError::Rpc {
                method: method.to_string(),
                code: err.code,
                message,
            });
        }

        let result = body.result.ok_or_else(|| SourceError::Decode {
            method: method.to_string(),
            reason: "response has neither result nor error".to_string(),
        })?;

        serde_json::from_value(result).map_err(|e| SourceError::Decode {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    /// Report the API version, useful as a connectivity check
    pub async fn api_version(&self) -> Result<String, SourceError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "apiinfo.version",
            "params": {},
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });
        // apiinfo.version must be called without an Authorization header
        let http_err = |source| SourceError::Http {
            method: "apiinfo.version".to_string(),
            source,
        };
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json-rpc")
            .body(payload.to_string())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;
        let body: RpcResponse = response.json().await.map_err(http_err)?;

        match (body.result, body.error) {
            (_, Some(err)) => Err(SourceError::Rpc {
                method: "apiinfo.version".to_string(),
                code: err.code,
                message: err.message,
            }),
            (Some(Value::String(version)), None) => Ok(version),
            _ => Err(SourceError::Decode {
                method: "apiinfo.version".to_string(),
                reason: "expected a version string".to_string(),
            }),
        }
    }
}

#[async_trait]
impl InventorySource for ZabbixClient {
    async fn discover_devices(&self) -> Result<Vec<Device>, SourceError> {
        let hosts: Vec<RawHost> = self
            .call(
                "host.get",
                json!({
                    "output": ["hostid", "host", "name"],
                    "selectInventory": ["type", "location"],
                }),
            )
            .await?;

        Ok(hosts.into_iter().map(Device::from).collect())
    }

    async fn items_for(&self, device: &Device) -> Result<Vec<MetricItem>, SourceError> {
        let items: Vec<RawItem> = self
            .call(
                "item.get",
                json!({
                    "output": ["itemid", "name", "key_", "value_type", "units", "lastvalue", "snmp_oid"],
                    "hostids": device.hostid,
                    "sortfield": "name",
                    "limit": ITEM_LIMIT,
                }),
            )
            .await?;

        Ok(items.into_iter().map(MetricItem::from).collect())
    }

    async fn history_last_two(&self, item: &MetricItem) -> Result<Vec<HistorySample>, SourceError> {
        self.call(
            "history.get",
            json!({
                "output": ["clock", "value"],
                "history": item.value_type,
                "itemids": item.id,
                "sortfield": "clock",
                "sortorder": "DESC",
                "limit": 2,
            }),
        )
        .await
    }
}

/// Builder for [`ZabbixClient`]
pub struct ZabbixClientBuilder {
    config: ZabbixConfig,
}

impl ZabbixClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ZabbixConfig::default(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = token.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ZabbixClient> {
        if self.config.api_token.is_empty() {
            anyhow::bail!("Zabbix API token is required");
        }
        ZabbixClient::new(self.config)
    }
}

impl Default for ZabbixClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
