//! Core data models for the polling agent and the ingestion service

use crate::classify::Severity;
use crate::rate::CounterWidth;
use serde::{Deserialize, Serialize};

/// A monitored device as reported by the inventory provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub hostid: String,
    /// Technical host name, used as the device id downstream
    pub host: String,
    /// Visible name
    pub name: String,
    pub location: Option<String>,
    pub inventory_type: Option<String>,
}

/// One polled item on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricItem {
    pub id: String,
    pub name: String,
    pub key: String,
    pub last_value: Option<String>,
    /// History storage type on the source (0 float, 3 unsigned, ...)
    pub value_type: u32,
    pub units: String,
    /// Counter width when the source declares it
    pub declared_width: Option<CounterWidth>,
}

/// A raw historical sample, newest first when returned in a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub value: String,
    pub clock: String,
}

/// Whether a metric is a monotonic counter or a point-in-time gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Counter,
    #[default]
    Gauge,
    /// Any kind reported by other producers; stored as `other`
    #[serde(other)]
    Other,
}

/// Device/interface context attached to every metric document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricMeta {
    pub device_id: String,
    #[serde(default)]
    pub hostid: Option<String>,
    #[serde(default)]
    pub ifindex: Option<String>,
    #[serde(default)]
    pub ifdescr: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Unrecognised metadata is carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Time-series metric document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    #[serde(default = "now_ts")]
    pub ts: i64,
    pub meta: MetricMeta,
    pub metric: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub value_type: ValueKind,
}

/// Numbers backing an event, for operator visibility
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub rate_bps: Option<f64>,
    #[serde(default)]
    pub link_speed_bps: Option<f64>,
}

/// Anomaly event document, emitted only for non-OK statuses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub device_id: String,
    #[serde(default)]
    pub hostid: Option<String>,
    #[serde(default)]
    pub iface: Option<String>,
    pub metric: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    pub status: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default = "now_ts")]
    pub detected_at: i64,
    #[serde(default)]
    pub evidence: Option<Evidence>,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn default_severity() -> Severity {
    Severity::Info
}

/// Render a raw reading as a JSON number when it parses, else as the raw string.
///
/// Integer readings keep full precision; 64-bit counters exceed what an f64
/// represents exactly.
pub fn json_value(raw: &str) -> serde_json::Value {
    let trimmed = raw.trim();
    let number = if let Ok(n) = trimmed.parse::<u64>() {
        Some(serde_json::Number::from(n))
    } else if let Ok(n) = trimmed.parse::<i64>() {
        Some(serde_json::Number::from(n))
    } else {
        trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
    };

    number
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(raw.to_string()))
}
