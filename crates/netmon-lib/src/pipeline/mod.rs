//! Poll cycle orchestration
//!
//! One cycle walks every device, groups its items per interface, derives
//! traffic rates (history first, counter cache as fallback), classifies each
//! instance and hands the resulting metric and event batches to the
//! ingestion sink. The counter cache is flushed at the end of every cycle.
//!
//! Cycles never overlap: the orchestrator is a single task that awaits each
//! step in turn.

mod orchestrator;

#[cfg(test)]
mod tests;

pub use orchestrator::{CycleOrchestrator, CycleOrchestratorBuilder};

use crate::classify::ClassifierThresholds;
use crate::error::DataError;
use crate::interface::ItemFilter;
use crate::models::HistorySample;
use crate::rate::{
    compute_rate, parse_counter_value, parse_timestamp, CounterWidth, RateResult, RateUnavailable,
};
use crate::source::DiscoveryScope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Which hosts and items a deployment polls, and how idle instances are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineProfile {
    pub discovery: DiscoveryScope,
    pub item_filter: ItemFilter,
    /// Re-run host discovery every cycle instead of once at startup
    pub refresh_hosts_every_cycle: bool,
    /// Emit info events for instances without a usable rate
    pub emit_idle_events: bool,
}

/// Configuration for the cycle orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Idle time between the end of one cycle and the start of the next
    pub poll_interval: Duration,
    pub profile: PipelineProfile,
    pub thresholds: ClassifierThresholds,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            profile: PipelineProfile::default(),
            thresholds: ClassifierThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Collecting,
    Flushing,
}

/// Outcome of one poll cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Sequence number, starting at 1
    pub cycle: u64,
    /// Timestamp stamped on every record of the cycle
    pub ts: i64,
    pub devices: usize,
    pub instances: usize,
    pub rates_computed: usize,
    pub rates_unavailable: BTreeMap<&'static str, usize>,
    pub metrics_emitted: usize,
    pub events_emitted: usize,
    pub transport_failures: usize,
    pub source_errors: usize,
    /// True when the counter cache was written to disk
    pub cache_persisted: bool,
    pub elapsed: Duration,
}

impl CycleReport {
    pub(crate) fn record_unavailable(&mut self, reason: RateUnavailable) {
        *self.rates_unavailable.entry(reason.as_label()).or_default() += 1;
    }

    /// Number of instances whose rate was unavailable for `reason`
    pub fn unavailable(&self, reason: RateUnavailable) -> usize {
        self.rates_unavailable
            .get(reason.as_label())
            .copied()
            .unwrap_or(0)
    }
}

/// Parse the two newest history samples into `(newest, previous)` observations
fn history_pair(samples: &[HistorySample]) -> Result<((u64, i64), (u64, i64)), DataError> {
    let [newest, previous, ..] = samples else {
        return Err(DataError::ShortHistory(samples.len()));
    };

    let parse = |s: &HistorySample| -> Result<(u64, i64), DataError> {
        Ok((parse_counter_value(&s.value)?, parse_timestamp(&s.clock)?))
    };

    Ok((parse(newest)?, parse(previous)?))
}

/// Rate from a newest-first history listing
pub fn rate_from_history(samples: &[HistorySample], width: CounterWidth) -> RateResult {
    match history_pair(samples) {
        Ok(((curr, curr_ts), (prev, prev_ts))) => compute_rate(prev, prev_ts, curr, curr_ts, width),
        Err(DataError::ShortHistory(_)) => Err(RateUnavailable::NoBaseline),
        Err(_) => Err(RateUnavailable::InvalidSample),
    }
}
