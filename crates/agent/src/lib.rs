//! Network polling agent
//!
//! Polls a Zabbix server for interface counters, derives rates, classifies
//! each interface and forwards metrics and events to the ingestion service.

pub mod api;
pub mod config;
