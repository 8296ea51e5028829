//! Interface status classification
//!
//! Derives a qualitative status from a computed rate, the link capacity and
//! the reported operational state. An interface reported down always
//! classifies as link-down, whatever its traffic reading says.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of link capacity above which an interface is saturated
pub const DEFAULT_SATURATION_RATIO: f64 = 0.90;

/// Absolute rate threshold used when the link capacity is unknown
pub const DEFAULT_ABSOLUTE_THRESHOLD: f64 = 100e6;

pub const LABEL_LINK_DOWN: &str = "link-down";
pub const LABEL_HIGH_BANDWIDTH: &str = "high-bandwidth";

/// Qualitative outcome for one metric instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Status {
    Ok,
    LinkDown,
    HighBandwidth { percent_of_link: Option<f64> },
    NoData,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn severity(&self) -> Severity {
        match self {
            Status::LinkDown => Severity::Critical,
            Status::HighBandwidth { .. } => Severity::Warning,
            Status::Ok | Status::NoData => Severity::Info,
        }
    }

    /// Labels used downstream for alert routing
    pub fn labels(&self) -> Vec<String> {
        match self {
            Status::LinkDown => vec![LABEL_LINK_DOWN.to_string()],
            Status::HighBandwidth { .. } => vec![LABEL_HIGH_BANDWIDTH.to_string()],
            Status::Ok | Status::NoData => Vec::new(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::LinkDown => write!(f, "Operational state != up - check link/config"),
            Status::HighBandwidth {
                percent_of_link: Some(pct),
            } => write!(f, "High bandwidth ({:.1}% of link)", pct),
            Status::HighBandwidth {
                percent_of_link: None,
            } => write!(f, "High bandwidth (bps)"),
            Status::NoData => write!(f, "No rate available (idle or insufficient history)"),
        }
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full classification result
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: Status,
    pub severity: Severity,
    pub labels: Vec<String>,
}

impl From<Status> for Classification {
    fn from(status: Status) -> Self {
        Self {
            severity: status.severity(),
            labels: status.labels(),
            status,
        }
    }
}

/// Thresholds for bandwidth classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    /// Ratio of link capacity above which traffic is a warning
    pub saturation_ratio: f64,
    /// Absolute rate above which traffic is a warning when capacity is unknown
    pub absolute_threshold: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            saturation_ratio: DEFAULT_SATURATION_RATIO,
            absolute_threshold: DEFAULT_ABSOLUTE_THRESHOLD,
        }
    }
}

/// Classifies instances from rate, capacity and operational state
#[derive(Debug, Clone, Default)]
pub struct StatusClassifier {
    pub thresholds: ClassifierThresholds,
}

impl StatusClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify one instance.
    ///
    /// # Arguments
    /// * `rate` - Computed rate, if any, in the same unit as `link_capacity`
    /// * `link_capacity` - Declared link capacity; zero counts as unknown
    /// * `oper_up` - Reported operational state, if known
    pub fn classify(
        &self,
        rate: Option<f64>,
        link_capacity: Option<f64>,
        oper_up: Option<bool>,
    ) -> Classification {
        if oper_up == Some(false) {
            return Status::LinkDown.into();
        }

        let Some(rate) = rate else {
            return Status::NoData.into();
        };

        let status = match link_capacity.filter(|c| *c > 0.0) {
            Some(capacity) => {
                let ratio = rate / capacity;
                if ratio > self.thresholds.saturation_ratio {
                    Status::HighBandwidth {
                        percent_of_link: Some(ratio * 100.0),
                    }
                } else {
                    Status::Ok
                }
            }
            None if rate > self.thresholds.absolute_threshold => Status::HighBandwidth {
                percent_of_link: None,
            },
            None => Status::Ok,
        };

        status.into()
    }
}

/// Classify with default thresholds
pub fn classify(rate: Option<f64>, link_capacity: Option<f64>, oper_up: Option<bool>) -> Classification {
    StatusClassifier::default().classify(rate, link_capacity, oper_up)
}

/// Interpret a raw operational-status reading.
///
/// Numeric values follow IF-MIB ifOperStatus, where only 1 means up.
pub fn parse_oper_status(raw: &str) -> Option<bool> {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return None;
    }

    if let Ok(n) = value.parse::<f64>() {
        if n.is_finite() {
            return Some(n.trunc() == 1.0);
        }
    }

    match value.as_str() {
        "up" | "running" => Some(true),
        "down" | "notpresent" | "lowerlayerdown" => Some(false),
        _ => None,
    }
}
