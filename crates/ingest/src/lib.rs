//! Ingestion service
//!
//! Accepts metric and event batches from polling agents, keeps them in a
//! retention-bounded store and serves time-range queries.

pub mod api;
pub mod config;
pub mod store;
