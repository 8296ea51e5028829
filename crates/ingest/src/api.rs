//! HTTP routes of the ingestion service

use crate::store::{MetricQuery, RecordStore, DEFAULT_EVENTS_LIMIT};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use netmon_lib::models::{EventRecord, MetricRecord};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
}

impl AppState {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }
}

/// `{"count": n, "data": [...]}` envelope for listings
#[derive(Debug, Serialize, Deserialize)]
pub struct Listing<T> {
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for Listing<T> {
    fn from(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    pub device_id: Option<String>,
    #[serde(default = "default_events_limit")]
    pub limit: usize,
}

fn default_events_limit() -> usize {
    DEFAULT_EVENTS_LIMIT
}

async fn ingest_metrics(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<MetricRecord>>,
) -> impl IntoResponse {
    let inserted = state.store.insert_metrics(records).await;
    debug!(inserted = inserted, "Metrics ingested");
    (StatusCode::CREATED, Json(json!({ "inserted": inserted })))
}

async fn ingest_events(
    State(state): State<Arc<AppState>>,
    Json(records): Json<Vec<EventRecord>>,
) -> impl IntoResponse {
    let inserted = state.store.insert_events(records).await;
    debug!(inserted = inserted, "Events ingested");
    (StatusCode::CREATED, Json(json!({ "inserted": inserted })))
}

async fn query_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricQuery>,
) -> Json<Listing<MetricRecord>> {
    Json(state.store.query_metrics(&query).await.into())
}

async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventQuery>,
) -> Json<Listing<EventRecord>> {
    let events = state
        .store
        .recent_events(query.device_id.as_deref(), query.limit)
        .await;
    Json(events.into())
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (metrics, events) = state.store.counts().await;
    Json(json!({ "status": "healthy", "metrics": metrics, "events": events }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ingest/metrics", post(ingest_metrics))
        .route("/ingest/events", post(ingest_events))
        .route("/metrics", get(query_metrics))
        .route("/events", get(list_events))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting ingestion API");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
