//! Offline rate calculation

use super::Sample;
use crate::output::{format_bps, print_json, print_success, print_warning, OutputFormat};
use colored::Colorize;
use netmon_lib::classify::classify;
use netmon_lib::rate::{check_link_capacity, compute_rate, to_bits_per_second, CounterWidth};
use serde::Serialize;

/// Inputs of `netmon rate`
#[derive(Debug, Clone)]
pub struct RateInput {
    pub prev: Sample,
    pub curr: Sample,
    /// Item key, used to guess the width when none is given
    pub key: String,
    pub width: Option<CounterWidth>,
    /// The counter counts octets rather than bits
    pub bytes: bool,
    pub link_speed_bps: Option<f64>,
}

/// What the agent would derive from the two samples
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateReport {
    pub width_bits: u32,
    pub interval_secs: i64,
    /// Per-second rate in the counter's own unit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_per_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_bps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub status: String,
}

pub fn evaluate(input: &RateInput) -> RateReport {
    let width = CounterWidth::resolve(input.width, &input.key);
    let native = compute_rate(input.prev.value, input.prev.ts, input.curr.value, input.curr.ts, width);

    let bps = native.and_then(|rate| {
        let bps = if input.bytes {
            to_bits_per_second(rate)
        } else {
            rate
        };
        check_link_capacity(bps, input.link_speed_bps)
    });

    let status = classify(bps.ok(), input.link_speed_bps, None).status;
    let failure = bps.err();

    RateReport {
        width_bits: match width {
            CounterWidth::Bits32 => 32,
            CounterWidth::Bits64 => 64,
        },
        interval_secs: input.curr.ts.saturating_sub(input.prev.ts),
        rate_per_sec: native.ok(),
        rate_bps: bps.ok(),
        unavailable: failure.map(|f| f.as_label()),
        reason: failure.map(|f| f.to_string()),
        status: status.to_string(),
    }
}

pub fn run(input: &RateInput, format: OutputFormat) -> anyhow::Result<()> {
    let report = evaluate(input);

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            println!("{}", "Rate Calculation".bold());
            println!("{}", "=".repeat(50));
            println!("Counter width:  {}-bit", report.width_bits);
            println!("Interval:       {}s", report.interval_secs);
            if let Some(rate) = report.rate_per_sec {
                println!("Rate:           {:.3}/s", rate);
            }
            println!();

            match (report.rate_bps, &report.reason) {
                (Some(bps), _) => print_success(&format!("{} ({})", format_bps(bps), report.status)),
                (None, Some(reason)) => print_warning(&format!(
                    "Rate unavailable: {} [{}]",
                    reason,
                    report.unavailable.unwrap_or_default()
                )),
                (None, None) => print_warning("Rate unavailable"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(prev: (u64, i64), curr: (u64, i64)) -> RateInput {
        RateInput {
            prev: Sample { value: prev.0, ts: prev.1 },
            curr: Sample { value: curr.0, ts: curr.1 },
            key: "net.if.in[ifInOctets.1]".to_string(),
            width: None,
            bytes: false,
            link_speed_bps: None,
        }
    }

    #[test]
    fn test_plain_rate() {
        let report = evaluate(&input((1000, 100), (1500, 130)));

        assert_eq!(report.width_bits, 32);
        assert_eq!(report.interval_secs, 30);
        let rate = report.rate_per_sec.unwrap();
        assert!((rate - 500.0 / 30.0).abs() < 1e-9);
        assert_eq!(report.rate_bps, Some(rate));
        assert_eq!(report.status, "OK");
        assert!(report.unavailable.is_none());
    }

    #[test]
    fn test_bytes_are_converted_to_bits() {
        let mut args = input((0, 0), (1000, 10));
        args.bytes = true;

        let report = evaluate(&args);
        assert_eq!(report.rate_per_sec, Some(100.0));
        assert_eq!(report.rate_bps, Some(800.0));
    }

    #[test]
    fn test_wrap_with_explicit_width() {
        let mut args = input(((1u64 << 32) - 10, 1000), (5, 1010));
        assert_eq!(evaluate(&args).rate_per_sec, Some(1.5));

        args.width = Some(CounterWidth::Bits64);
        let report = evaluate(&args);
        assert_eq!(report.width_bits, 64);
        assert_eq!(report.unavailable, Some("ambiguous_wrap"));
        assert!(report.rate_bps.is_none());
        assert_eq!(report.status, "No rate available (idle or insufficient history)");
    }

    #[test]
    fn test_short_interval_reason() {
        let report = evaluate(&input((0, 100), (10, 101)));
        assert_eq!(report.unavailable, Some("interval_too_short"));
        assert_eq!(report.reason.as_deref(), Some("samples are less than 2s apart"));
    }

    #[test]
    fn test_link_speed_checks() {
        let mut args = input((0, 0), (9_500_000, 10));
        args.link_speed_bps = Some(1_000_000.0);
        let report = evaluate(&args);
        assert_eq!(report.rate_bps, Some(950_000.0));
        assert_eq!(report.status, "High bandwidth (95.0% of link)");

        args.curr.value = 200_000_000;
        let report = evaluate(&args);
        assert_eq!(report.unavailable, Some("exceeds_link_capacity"));
    }
}
