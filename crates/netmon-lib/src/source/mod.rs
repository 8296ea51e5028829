//! Inventory and telemetry sources
//!
//! The pipeline reads devices, items and short item history through the
//! [`InventorySource`] trait. [`ZabbixClient`] implements it over the
//! Zabbix JSON-RPC API.

mod zabbix;

pub use zabbix::{ZabbixClient, ZabbixClientBuilder, ZabbixConfig};

use crate::error::SourceError;
use crate::models::{Device, HistorySample, MetricItem};
use serde::{Deserialize, Serialize};

pub use async_trait::async_trait;

/// Trait for inventory/telemetry providers
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List all monitored devices
    async fn discover_devices(&self) -> Result<Vec<Device>, SourceError>;

    /// List the items of one device, with their latest values
    async fn items_for(&self, device: &Device) -> Result<Vec<MetricItem>, SourceError>;

    /// The two most recent history samples of an item, newest first.
    ///
    /// May return fewer than two samples.
    async fn history_last_two(&self, item: &MetricItem) -> Result<Vec<HistorySample>, SourceError>;
}

/// Which discovered hosts are polled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryScope {
    /// Skip the monitoring server itself and other non-network hosts
    #[default]
    NetworkOnly,
    AllHosts,
}

/// Inventory types naming network gear
const NETWORK_INVENTORY_TYPES: &[&str] = &["router", "switch", "firewall", "network", "gateway"];

impl DiscoveryScope {
    pub fn accepts(&self, device: &Device) -> bool {
        if device.hostid.is_empty() {
            return false;
        }
        match self {
            DiscoveryScope::AllHosts => true,
            DiscoveryScope::NetworkOnly => match network_inventory(device) {
                Some(is_network) => is_network,
                None => {
                    let host = device.host.to_lowercase();
                    !host.contains("zabbix") && !host.contains("server")
                }
            },
        }
    }
}

/// What the host inventory says about the device role, when it says anything.
///
/// A recognised network type wins over the host name; an inventory naming a
/// server rejects the host.
fn network_inventory(device: &Device) -> Option<bool> {
    let kind = device.inventory_type.as_deref()?.trim().to_lowercase();
    if kind.is_empty() {
        return None;
    }
    if NETWORK_INVENTORY_TYPES.iter().any(|t| kind.contains(t)) {
        Some(true)
    } else if kind.contains("server") {
        Some(false)
    } else {
        None
    }
}
