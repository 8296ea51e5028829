//! Subcommand implementations and their argument parsers

pub mod cache;
pub mod events;
pub mod metrics;
pub mod rate;

use netmon_lib::rate::{parse_counter_value, parse_timestamp, CounterWidth};
use std::time::Duration;
use thiserror::Error;

/// Rejected command-line value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("invalid duration {0:?}, expected e.g. 90s, 30m, 1h or 7d")]
    Duration(String),

    #[error("invalid sample {0:?}, expected VALUE@TIMESTAMP")]
    Sample(String),

    #[error("unsupported counter width {0:?}, expected 32 or 64")]
    Width(String),
}

/// Parse a look-back window such as `30m`, `1h` or `7d`; a bare number is seconds
pub fn parse_since(raw: &str) -> Result<Duration, ArgError> {
    let trimmed = raw.trim();
    let (digits, unit) = match trimmed.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&trimmed[..i], c),
        _ => (trimmed, 's'),
    };

    let amount: u64 = digits
        .parse()
        .map_err(|_| ArgError::Duration(raw.to_string()))?;
    let scale = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        'w' => 7 * 86_400,
        _ => return Err(ArgError::Duration(raw.to_string())),
    };

    match amount.checked_mul(scale) {
        Some(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ArgError::Duration(raw.to_string())),
    }
}

/// One counter observation given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub value: u64,
    pub ts: i64,
}

/// Parse `VALUE@TIMESTAMP`, e.g. `1000@1700000000`
pub fn parse_sample(raw: &str) -> Result<Sample, ArgError> {
    let invalid = || ArgError::Sample(raw.to_string());

    let (value, ts) = raw.split_once('@').ok_or_else(invalid)?;
    Ok(Sample {
        value: parse_counter_value(value).map_err(|_| invalid())?,
        ts: parse_timestamp(ts).map_err(|_| invalid())?,
    })
}

pub fn parse_width(raw: &str) -> Result<CounterWidth, ArgError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .and_then(CounterWidth::from_bits)
        .ok_or_else(|| ArgError::Width(raw.to_string()))
}
