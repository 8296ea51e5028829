//! Counter-to-rate derivation
//!
//! Turns two samples of a monotonic counter into a per-second rate. A single
//! wraparound is corrected; samples that cannot be trusted (too close in
//! time, reset counters, multiple wraps, absurd magnitudes) yield a typed
//! [`RateUnavailable`] reason instead of a number.

use crate::error::DataError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum spacing between two samples, in seconds
pub const MIN_INTERVAL_SECS: i64 = 2;

/// Sanity ceiling on any computed rate (units per second)
pub const IMPLAUSIBLE_RATE: f64 = 5e12;

/// A rate above this multiple of the declared link capacity is discarded
pub const LINK_CAPACITY_FACTOR: f64 = 10.0;

/// Result of a rate computation
pub type RateResult = Result<f64, RateUnavailable>;

/// Why no usable rate could be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RateUnavailable {
    #[error("current sample is not newer than the previous one")]
    NonCausalInterval,
    #[error("samples are less than 2s apart")]
    IntervalTooShort,
    #[error("counter went backwards beyond a single wrap (reset)")]
    CounterReset,
    #[error("delta exceeds half the counter width (ambiguous wrap)")]
    AmbiguousWrap,
    #[error("rate exceeds the plausibility ceiling")]
    Implausible,
    #[error("rate exceeds 10x the link capacity")]
    ExceedsLinkCapacity,
    #[error("no previous sample to compare against")]
    NoBaseline,
    #[error("sample could not be parsed")]
    InvalidSample,
}

impl RateUnavailable {
    /// Stable label used for metrics and logs
    pub fn as_label(&self) -> &'static str {
        match self {
            RateUnavailable::NonCausalInterval => "non_causal",
            RateUnavailable::IntervalTooShort => "interval_too_short",
            RateUnavailable::CounterReset => "counter_reset",
            RateUnavailable::AmbiguousWrap => "ambiguous_wrap",
            RateUnavailable::Implausible => "implausible",
            RateUnavailable::ExceedsLinkCapacity => "exceeds_link_capacity",
            RateUnavailable::NoBaseline => "no_baseline",
            RateUnavailable::InvalidSample => "invalid_sample",
        }
    }
}

/// Bit width of a hardware counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterWidth {
    Bits32,
    Bits64,
}

/// IF-MIB ifXTable columns that are Counter64 (ifHCInOctets .. ifHCOutBroadcastPkts)
const IFX_TABLE_OID: &str = "1.3.6.1.2.1.31.1.1.1.";
const IFX_HC_COLUMNS: std::ops::RangeInclusive<u32> = 6..=13;
/// IF-MIB ifTable, all counters are Counter32
const IF_TABLE_OID: &str = "1.3.6.1.2.1.2.2.1.";

impl CounterWidth {
    /// Number of distinct values the counter can hold
    pub fn modulus(self) -> u128 {
        match self {
            CounterWidth::Bits32 => 1u128 << 32,
            CounterWidth::Bits64 => 1u128 << 64,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(CounterWidth::Bits32),
            64 => Some(CounterWidth::Bits64),
            _ => None,
        }
    }

    /// Guess the width from an item key.
    ///
    /// Heuristic only: high-capacity ("HC") and explicit "64" keys are treated
    /// as 64-bit, everything else as 32-bit.
    pub fn guess(key: &str) -> Self {
        let key = key.to_lowercase();
        if key.contains("ifhc") || key.contains("hc") || key.contains("64") {
            CounterWidth::Bits64
        } else {
            CounterWidth::Bits32
        }
    }

    /// Declared width from an SNMP OID, when the OID names a known IF-MIB counter
    pub fn from_snmp_oid(oid: &str) -> Option<Self> {
        let oid = oid.trim().trim_start_matches('.');
        if oid.is_empty() {
            return None;
        }

        if let Some(column) = oid.strip_prefix(IFX_TABLE_OID) {
            let column: u32 = column.split('.').next()?.parse().ok()?;
            return Some(if IFX_HC_COLUMNS.contains(&column) {
                CounterWidth::Bits64
            } else {
                CounterWidth::Bits32
            });
        }
        if oid.starts_with(IF_TABLE_OID) {
            return Some(CounterWidth::Bits32);
        }

        // Textual form, e.g. "IF-MIB::ifHCInOctets.3"
        let object = oid.rsplit("::").next().unwrap_or(oid);
        if object.starts_with("ifHC") {
            Some(CounterWidth::Bits64)
        } else if object.starts_with("ifIn") || object.starts_with("ifOut") {
            Some(CounterWidth::Bits32)
        } else {
            None
        }
    }

    /// Prefer a declared width, falling back to the key heuristic
    pub fn resolve(declared: Option<CounterWidth>, key: &str) -> Self {
        declared.unwrap_or_else(|| Self::guess(key))
    }
}

/// Compute a per-second rate from two counter samples.
///
/// Assumes at most one wraparound between the samples. The result is in the
/// counter's native unit; unit conversion is left to the caller.
pub fn compute_rate(
    prev_value: u64,
    prev_ts: i64,
    curr_value: u64,
    curr_ts: i64,
    width: CounterWidth,
) -> RateResult {
    let dt = curr_ts.saturating_sub(prev_ts);
    if dt <= 0 {
        return Err(RateUnavailable::NonCausalInterval);
    }
    if dt < MIN_INTERVAL_SECS {
        return Err(RateUnavailable::IntervalTooShort);
    }

    let modulus = width.modulus() as i128;
    let (prev, curr) = (prev_value as i128, curr_value as i128);
    let delta = if curr < prev {
        curr + modulus - prev
    } else {
        curr - prev
    };

    if delta < 0 {
        return Err(RateUnavailable::CounterReset);
    }
    if delta > modulus / 2 {
        return Err(RateUnavailable::AmbiguousWrap);
    }

    let rate = delta as f64 / dt as f64;
    if rate > IMPLAUSIBLE_RATE {
        return Err(RateUnavailable::Implausible);
    }

    Ok(rate)
}

/// Convert a byte rate into bits per second
pub fn to_bits_per_second(bytes_per_sec: f64) -> f64 {
    bytes_per_sec * 8.0
}

/// Discard a rate that is implausibly far above the link's declared capacity
pub fn check_link_capacity(rate_bps: f64, link_capacity_bps: Option<f64>) -> RateResult {
    match link_capacity_bps {
        Some(capacity) if capacity > 0.0 && rate_bps > capacity * LINK_CAPACITY_FACTOR => {
            Err(RateUnavailable::ExceedsLinkCapacity)
        }
        _ => Ok(rate_bps),
    }
}

/// Parse a raw counter reading as reported by the monitoring platform.
///
/// Integers are taken as-is. Finite, non-negative decimals are truncated.
pub fn parse_counter_value(raw: &str) -> Result<u64, DataError> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<u64>() {
        return Ok(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v as u64),
        _ => Err(DataError::NotNumeric(raw.to_string())),
    }
}

/// Parse a unix timestamp in seconds
pub fn parse_timestamp(raw: &str) -> Result<i64, DataError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| DataError::BadTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const W32: u64 = 1 << 32;

    #[test]
    fn test_monotonic_rate() {
        let rate = compute_rate(1000, 100, 1500, 130, CounterWidth::Bits32).unwrap();
        assert!((rate - 500.0 / 30.0).abs() < 1e-9);
        assert!(rate >= 0.0);
    }

    #[test]
    fn test_equal_values_give_zero_rate() {
        let rate = compute_rate(42, 0, 42, 60, CounterWidth::Bits64).unwrap();
        assert_eq!(rate, 0.0);
    }

    #[test]
    fn test_single_wraparound_32bit() {
        let rate = compute_rate(W32 - 10, 1000, 5, 1010, CounterWidth::Bits32).unwrap();
        assert!((rate - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_wraparound_64bit() {
        let rate = compute_rate(u64::MAX - 9, 1000, 5, 1010, CounterWidth::Bits64).unwrap();
        assert!((rate - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_ambiguous_multi_wrap() {
        // Wrap-corrected delta is 2^32 - 100, far more than half the width
        let result = compute_rate(200, 0, 100, 60, CounterWidth::Bits32);
        assert_eq!(result, Err(RateUnavailable::AmbiguousWrap));

        // Forward delta larger than half the width is just as ambiguous
        let result = compute_rate(0, 0, W32 / 2 + 1, 60, CounterWidth::Bits32);
        assert_eq!(result, Err(RateUnavailable::AmbiguousWrap));
    }

    #[test]
    fn test_reset_beyond_width() {
        // A 64-bit value read against a 32-bit width cannot be wrap-corrected
        let result = compute_rate(10 * W32, 0, 1, 60, CounterWidth::Bits32);
        assert_eq!(result, Err(RateUnavailable::CounterReset));
    }

    #[test]
    fn test_time_gap_guards() {
        assert_eq!(
            compute_rate(0, 100, 10, 101, CounterWidth::Bits32),
            Err(RateUnavailable::IntervalTooShort)
        );
        assert_eq!(
            compute_rate(0, 100, 10, 100, CounterWidth::Bits32),
            Err(RateUnavailable::NonCausalInterval)
        );
        assert_eq!(
            compute_rate(0, 100, 10, 95, CounterWidth::Bits32),
            Err(RateUnavailable::NonCausalInterval)
        );
        assert!(compute_rate(0, 100, 10, 102, CounterWidth::Bits32).is_ok());
    }

    #[test]
    fn test_implausible_magnitude() {
        // 6e13 over 10s = 6e12/s, above the ceiling but well inside 64-bit width
        let result = compute_rate(0, 0, 60_000_000_000_000, 10, CounterWidth::Bits64);
        assert_eq!(result, Err(RateUnavailable::Implausible));

        let ok = compute_rate(0, 0, 40_000_000_000_000, 10, CounterWidth::Bits64);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_guess_width() {
        assert_eq!(CounterWidth::guess("net.if.in[ifHCInOctets.2]"), CounterWidth::Bits64);
        assert_eq!(CounterWidth::guess("counter64.rx"), CounterWidth::Bits64);
        assert_eq!(CounterWidth::guess("net.if.in[ifInOctets.2]"), CounterWidth::Bits32);
    }

    #[test]
    fn test_declared_width_wins() {
        assert_eq!(
            CounterWidth::resolve(Some(CounterWidth::Bits32), "ifHCInOctets"),
            CounterWidth::Bits32
        );
        assert_eq!(CounterWidth::resolve(None, "ifHCInOctets"), CounterWidth::Bits64);
    }

    #[test]
    fn test_width_from_snmp_oid() {
        assert_eq!(
            CounterWidth::from_snmp_oid("1.3.6.1.2.1.31.1.1.1.6.{#SNMPINDEX}"),
            Some(CounterWidth::Bits64)
        );
        assert_eq!(
            CounterWidth::from_snmp_oid(".1.3.6.1.2.1.31.1.1.1.2.4"),
            Some(CounterWidth::Bits32)
        );
        assert_eq!(
            CounterWidth::from_snmp_oid("1.3.6.1.2.1.2.2.1.10.1"),
            Some(CounterWidth::Bits32)
        );
        assert_eq!(
            CounterWidth::from_snmp_oid("IF-MIB::ifHCOutOctets.7"),
            Some(CounterWidth::Bits64)
        );
        assert_eq!(CounterWidth::from_snmp_oid("1.3.6.1.4.1.9.9.1"), None);
        assert_eq!(CounterWidth::from_snmp_oid(""), None);
    }

    #[test]
    fn test_link_capacity_cross_check() {
        assert_eq!(
            check_link_capacity(11e9, Some(1e9)),
            Err(RateUnavailable::ExceedsLinkCapacity)
        );
        assert_eq!(check_link_capacity(9e9, Some(1e9)), Ok(9e9));
        assert_eq!(check_link_capacity(11e9, None), Ok(11e9));
        assert_eq!(check_link_capacity(11e9, Some(0.0)), Ok(11e9));
    }

    #[test]
    fn test_parse_counter_value() {
        assert_eq!(parse_counter_value("18446744073709551615"), Ok(u64::MAX));
        assert_eq!(parse_counter_value(" 1500 "), Ok(1500));
        assert_eq!(parse_counter_value("1500.75"), Ok(1500));
        assert!(parse_counter_value("-3").is_err());
        assert!(parse_counter_value("up").is_err());
        assert!(parse_counter_value("NaN").is_err());
    }

    #[test]
    fn test_bits_conversion() {
        assert_eq!(to_bits_per_second(125.0), 1000.0);
    }
}
