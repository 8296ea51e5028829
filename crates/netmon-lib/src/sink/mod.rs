//! Ingestion boundary
//!
//! This module provides:
//! - The [`IngestSink`] trait the cycle orchestrator hands batches to
//! - An HTTP client posting JSON batches to the ingestion service
//! - Bounded retry with linear backoff

mod http;
mod retry;

pub use http::{HttpIngestClient, IngestClientConfig};
pub use retry::RetryPolicy;

use crate::error::IngestError;
use crate::models::{EventRecord, MetricRecord};

pub use async_trait::async_trait;

/// Destination for the per-cycle metric and event batches
#[async_trait]
pub trait IngestSink: Send + Sync {
    /// Deliver one batch of metric documents; returns the number accepted
    async fn send_metrics(&self, metrics: &[MetricRecord]) -> Result<usize, IngestError>;

    /// Deliver one batch of event documents; returns the number accepted
    async fn send_events(&self, events: &[EventRecord]) -> Result<usize, IngestError>;
}
