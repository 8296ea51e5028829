//! Recent event listing

use crate::client::ApiClient;
use crate::output::{color_severity, format_timestamp, format_value, print_listing, OutputFormat};
use anyhow::Result;
use netmon_lib::models::EventRecord;
use tabled::Tabled;

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Detected (UTC)")]
    detected_at: String,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Interface")]
    iface: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&EventRecord> for EventRow {
    fn from(event: &EventRecord) -> Self {
        Self {
            detected_at: format_timestamp(event.detected_at),
            device: event.device_id.clone(),
            iface: event.iface.clone().unwrap_or_else(|| "-".to_string()),
            metric: event.metric.clone(),
            value: event.value.as_ref().map(format_value).unwrap_or_else(|| "-".to_string()),
            severity: color_severity(event.severity),
            status: event.status.clone(),
        }
    }
}

/// Show the most recent events, newest first
pub async fn show_events(
    client: &ApiClient,
    device: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let listing = client.events(device, limit).await?;
    let rows: Vec<EventRow> = listing.data.iter().map(EventRow::from).collect();
    print_listing(rows, &listing, format);
    Ok(())
}
