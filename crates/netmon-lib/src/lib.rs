//! Core library for the network polling agent
//!
//! This crate provides:
//! - Counter-to-rate derivation with wraparound handling and outlier rejection
//! - Interface status classification
//! - A persistent counter cache
//! - The poll cycle orchestrator, with its inventory source and ingestion sink
//! - Health checks and observability

pub mod cache;
pub mod classify;
pub mod error;
pub mod health;
pub mod interface;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod rate;
pub mod sink;
pub mod source;

pub use cache::{CacheEntry, CounterCache};
pub use classify::{Classification, ClassifierThresholds, Severity, Status, StatusClassifier};
pub use error::{DataError, IngestError, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
pub use pipeline::{CycleOrchestrator, CycleOrchestratorBuilder, CycleReport, PipelineProfile};
pub use rate::{compute_rate, CounterWidth, RateResult, RateUnavailable};
