//! Time-range metric queries

use crate::client::{ApiClient, MetricsQuery};
use crate::output::{format_timestamp, format_value, print_info, print_listing, OutputFormat};
use anyhow::Result;
use netmon_lib::models::{MetricRecord, ValueKind};
use std::time::Duration;
use tabled::Tabled;

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Time (UTC)")]
    time: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Type")]
    kind: &'static str,
    #[tabled(rename = "Interface")]
    iface: String,
}

impl From<&MetricRecord> for MetricRow {
    fn from(record: &MetricRecord) -> Self {
        Self {
            time: format_timestamp(record.ts),
            value: format_value(&record.value),
            kind: match record.value_type {
                ValueKind::Counter => "counter",
                ValueKind::Gauge => "gauge",
                ValueKind::Other => "other",
            },
            iface: record.meta.ifdescr.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// `[now - since, now]` as unix seconds
fn window(now: i64, since: Duration) -> (i64, i64) {
    let span = i64::try_from(since.as_secs()).unwrap_or(i64::MAX);
    (now.saturating_sub(span), now)
}

/// Show samples of one metric on one device over the look-back window
pub async fn show_metrics(
    client: &ApiClient,
    device: &str,
    metric: &str,
    since: Duration,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let (start_ts, end_ts) = window(chrono::Utc::now().timestamp(), since);
    let listing = client
        .metrics(&MetricsQuery {
            device_id: device,
            metric,
            start_ts,
            end_ts,
            limit,
        })
        .await?;

    let rows: Vec<MetricRow> = listing.data.iter().map(MetricRow::from).collect();
    print_listing(rows, &listing, format);

    if format == OutputFormat::Table && listing.count > 0 {
        print_info(&format!(
            "{} samples of {} on {} since {}",
            listing.count,
            metric,
            device,
            format_timestamp(start_ts)
        ));
    }

    Ok(())
}
