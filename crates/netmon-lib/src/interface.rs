//! Interface grouping
//!
//! Items on a device are grouped by interface index so that any traffic
//! metric can be cross-referenced with the link speed and operational
//! status of the same interface. Groups are rebuilt every poll cycle.

use crate::classify::parse_oper_status;
use crate::models::{MetricItem, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Group for items that carry no interface index
pub const GLOBAL_GROUP: &str = "_global";

/// Terms that mark an item as network-related (matched case-insensitively)
const NETWORK_ITEM_TERMS: &[&str] = &[
    "ifIn",
    "ifOut",
    "ifDescr",
    "ifInOctets",
    "ifOutOctets",
    "ifHCInOctets",
    "ifHCOutOctets",
    "ifSpeed",
    "ifHighSpeed",
    "ifOperStatus",
    "Interface",
    "Network",
    "Traffic",
    "Port",
    "Link",
    "Bits received",
    "Bits sent",
    "Operational status",
    "Duplex status",
    "Speed",
    "Inbound packets",
    "Outbound packets",
];

/// Terms that mark an item as a traffic counter
const TRAFFIC_TERMS: &[&str] = &["bits received", "bits sent", "ifin", "ifout", "octets"];

const OPER_STATUS_TERMS: &[&str] = &["operational status", "oper status", "operstatus"];

/// Which items of a device take part in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFilter {
    #[default]
    NetworkOnly,
    AllItems,
}

impl ItemFilter {
    pub fn accepts(&self, item: &MetricItem) -> bool {
        match self {
            ItemFilter::AllItems => true,
            ItemFilter::NetworkOnly => is_network_item(item),
        }
    }
}

/// Items sharing one interface index, with the context needed for classification
#[derive(Debug, Clone)]
pub struct InterfaceGroup {
    pub index: String,
    pub label: String,
    pub items: Vec<MetricItem>,
    /// Declared link capacity in bits per second
    pub link_capacity_bps: Option<f64>,
    pub oper_up: Option<bool>,
}

impl InterfaceGroup {
    fn new(index: String, items: Vec<MetricItem>) -> Self {
        let label = interface_label(&index, &items);
        let link_capacity_bps = link_capacity_bps(&items);
        let oper_up = oper_status(&items);
        Self {
            index,
            label,
            items,
            link_capacity_bps,
            oper_up,
        }
    }

    pub fn is_global(&self) -> bool {
        self.index == GLOBAL_GROUP
    }

    /// Interface index as reported downstream, `None` for the global group
    pub fn ifindex(&self) -> Option<&str> {
        (!self.is_global()).then_some(self.index.as_str())
    }
}

/// Group a device's items by interface index
pub fn group_items(items: Vec<MetricItem>, filter: ItemFilter) -> Vec<InterfaceGroup> {
    let mut by_index: BTreeMap<String, Vec<MetricItem>> = BTreeMap::new();
    for item in items.into_iter().filter(|it| filter.accepts(it)) {
        let index = parse_ifindex(&item.key).unwrap_or(GLOBAL_GROUP).to_string();
        by_index.entry(index).or_default().push(item);
    }

    by_index
        .into_iter()
        .map(|(index, items)| InterfaceGroup::new(index, items))
        .collect()
}

/// Extract the interface index from an item key.
///
/// Accepts `key[3]` as well as SNMP-style `key[ifHCInOctets.3]`.
pub fn parse_ifindex(key: &str) -> Option<&str> {
    let mut rest = key;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            return None;
        };
        let inner = &after[..close];
        if is_digits(inner) {
            return Some(inner);
        }
        if let Some((_, tail)) = inner.rsplit_once('.') {
            if is_digits(tail) {
                return Some(tail);
            }
        }
        rest = &after[close + 1..];
    }
    None
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let haystack = haystack.to_lowercase();
    needles.iter().any(|n| haystack.contains(&n.to_lowercase()))
}

/// Name shown for an item, falling back to its key
pub fn display_name(item: &MetricItem) -> &str {
    if item.name.is_empty() {
        &item.key
    } else {
        &item.name
    }
}

pub fn is_network_item(item: &MetricItem) -> bool {
    contains_any(&item.key, NETWORK_ITEM_TERMS) || contains_any(&item.name, NETWORK_ITEM_TERMS)
}

/// Traffic items get rate computation
pub fn is_traffic_item(item: &MetricItem) -> bool {
    contains_any(display_name(item), TRAFFIC_TERMS)
}

pub fn value_kind(item: &MetricItem) -> ValueKind {
    if is_traffic_item(item) || contains_any(display_name(item), &["packets"]) {
        ValueKind::Counter
    } else {
        ValueKind::Gauge
    }
}

/// Multiplier turning the counter's native rate into bits per second.
///
/// Interface counters count octets, including items presented as "Bits
/// received/sent". Only items whose units declare bits already are left as is.
pub fn bits_multiplier(item: &MetricItem) -> f64 {
    match item.units.trim().to_lowercase().as_str() {
        "bps" | "b/s" | "bit/s" => 1.0,
        _ => 8.0,
    }
}

fn is_oper_status_item(item: &MetricItem) -> bool {
    contains_any(&item.name, OPER_STATUS_TERMS) || contains_any(&item.key, &["ifoperstatus"])
}

fn oper_status(items: &[MetricItem]) -> Option<bool> {
    items
        .iter()
        .find(|it| is_oper_status_item(it))
        .and_then(|it| it.last_value.as_deref())
        .and_then(parse_oper_status)
}

/// Prefer ifHighSpeed (Mbps) since ifSpeed saturates at 4.29 Gbps
fn link_capacity_bps(items: &[MetricItem]) -> Option<f64> {
    let reading = |item: &MetricItem| -> Option<f64> {
        item.last_value
            .as_deref()?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
    };

    let high_speed = items
        .iter()
        .filter(|it| contains_any(&it.key, &["ifhighspeed"]))
        .find_map(|it| reading(it).map(|mbps| mbps * 1_000_000.0));
    if high_speed.is_some() {
        return high_speed;
    }

    items
        .iter()
        .filter(|it| contains_any(&it.key, &["ifspeed"]) || contains_any(&it.name, &["speed"]))
        .find_map(reading)
}

/// Human label: the interface description when available
fn interface_label(index: &str, items: &[MetricItem]) -> String {
    if index == GLOBAL_GROUP {
        return GLOBAL_GROUP.to_string();
    }

    items
        .iter()
        .filter(|it| contains_any(&it.key, &["ifdescr"]) || contains_any(&it.name, &["ifdescr"]))
        .find_map(|it| {
            it.last_value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .or_else(|| (!it.name.is_empty()).then(|| it.name.clone()))
        })
        .unwrap_or_else(|| format!("ifIndex {}", index))
}
