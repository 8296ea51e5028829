//! Error types shared across the polling pipeline

use thiserror::Error;

/// Failures talking to the monitoring platform's JSON-RPC API
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {method} failed: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} returned JSON-RPC error {code}: {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("{method} returned an unexpected payload: {reason}")]
    Decode { method: String, reason: String },
}

/// Failures delivering a batch to the ingestion backend
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("transport error posting to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("ingestion backend at {url} answered {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("gave up posting to {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },
}

/// A single sample that cannot be used for rate computation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("value {0:?} is not a non-negative number")]
    NotNumeric(String),

    #[error("timestamp {0:?} is not an integer")]
    BadTimestamp(String),

    #[error("history has {0} samples, need 2")]
    ShortHistory(usize),
}
