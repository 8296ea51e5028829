//! Agent configuration
//!
//! Read from `NETMON_*` environment variables, optionally layered over a
//! file named by `NETMON_CONFIG`. Nested keys use `__`, e.g.
//! `NETMON_PROFILE__EMIT_IDLE_EVENTS=true`.

use anyhow::{bail, Context, Result};
use netmon_lib::cache::DEFAULT_MAX_ENTRIES;
use netmon_lib::classify::ClassifierThresholds;
use netmon_lib::pipeline::PipelineProfile;
use netmon_lib::sink::{IngestClientConfig, RetryPolicy};
use netmon_lib::source::ZabbixConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name used in logs
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// Zabbix JSON-RPC endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Zabbix API token
    pub api_token: String,

    /// Ingestion service base URL; unset disables delivery
    #[serde(default)]
    pub backend_url: Option<String>,

    /// Idle time between poll cycles in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,

    /// Maximum instances tracked by the counter cache
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default)]
    pub profile: PipelineProfile,

    #[serde(default)]
    pub thresholds: ClassifierThresholds,
}

fn default_agent_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "netmon-agent".to_string())
}

fn default_api_url() -> String {
    "http://localhost/zabbix/api_jsonrpc.php".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("counter_cache.json")
}

fn default_cache_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_api_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

impl AgentConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("NETMON_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("NETMON")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read agent configuration")?;

        Self::from_config(config)
    }

    /// Deserialize and validate an already assembled configuration
    pub fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("Invalid agent configuration (NETMON_API_TOKEN is required)")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            bail!("NETMON_API_TOKEN must not be empty");
        }
        url::Url::parse(&self.api_url)
            .with_context(|| format!("Invalid NETMON_API_URL {:?}", self.api_url))?;
        if let Some(backend) = &self.backend_url {
            url::Url::parse(backend)
                .with_context(|| format!("Invalid NETMON_BACKEND_URL {:?}", backend))?;
        }
        if self.poll_interval_secs == 0 {
            bail!("NETMON_POLL_INTERVAL_SECS must be positive");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn zabbix_config(&self) -> ZabbixConfig {
        ZabbixConfig {
            url: self.api_url.clone(),
            api_token: self.api_token.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Ingestion client settings, `None` when no backend is configured
    pub fn ingest_config(&self) -> Option<IngestClientConfig> {
        let base_url = self.backend_url.as_ref().filter(|u| !u.trim().is_empty())?;
        Some(IngestClientConfig {
            base_url: base_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: RetryPolicy::new(
                self.retry_attempts,
                Duration::from_millis(self.retry_backoff_ms),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmon_lib::interface::ItemFilter;
    use netmon_lib::source::DiscoveryScope;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn build(overrides: &[(&str, &str)]) -> Result<AgentConfig> {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }
        AgentConfig::from_config(builder.build()?)
    }

    #[test]
    fn test_defaults() {
        let config = build(&[("api_token", "secret")]).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.cache_file, PathBuf::from("counter_cache.json"));
        assert_eq!(config.cache_max_entries, 100_000);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.profile, PipelineProfile::default());
        assert!(config.ingest_config().is_none());
        assert_eq!(config.zabbix_config().request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = build(&[]).unwrap_err();
        assert!(format!("{:#}", err).contains("api_token"));
    }

    #[test]
    fn test_blank_token_is_fatal() {
        assert_err!(build(&[("api_token", "  ")]));
    }

    #[test]
    fn test_invalid_backend_url_is_fatal() {
        assert_err!(build(&[("api_token", "secret"), ("backend_url", "not a url")]));
        assert_err!(build(&[("api_token", "secret"), ("poll_interval_secs", "0")]));
    }

    #[test]
    fn test_config_file_with_nested_tables() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
api_token = "from-file"
poll_interval_secs = 60

[profile]
refresh_hosts_every_cycle = true
"#,
        )
        .unwrap();

        let built = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .set_override("poll_interval_secs", "15")
            .unwrap()
            .build()
            .unwrap();
        let config = assert_ok!(AgentConfig::from_config(built));

        assert_eq!(config.api_token, "from-file");
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert!(config.profile.refresh_hosts_every_cycle);
        assert_eq!(config.profile.discovery, DiscoveryScope::default());
    }

    #[test]
    fn test_backend_and_retry_settings() {
        let config = build(&[
            ("api_token", "secret"),
            ("backend_url", "http://ingest:8000"),
            ("retry_attempts", "5"),
            ("retry_backoff_ms", "250"),
        ])
        .unwrap();

        let ingest = config.ingest_config().unwrap();
        assert_eq!(ingest.base_url, "http://ingest:8000");
        assert_eq!(ingest.retry.max_attempts, 5);
        assert_eq!(ingest.retry.backoff, Duration::from_millis(250));
    }

    #[test]
    fn test_profile_overrides() {
        let config = build(&[
            ("api_token", "secret"),
            ("profile.discovery", "all_hosts"),
            ("profile.item_filter", "all_items"),
            ("profile.emit_idle_events", "true"),
        ])
        .unwrap();

        assert_eq!(config.profile.discovery, DiscoveryScope::AllHosts);
        assert_eq!(config.profile.item_filter, ItemFilter::AllItems);
        assert!(config.profile.emit_idle_events);
        assert!(!config.profile.refresh_hosts_every_cycle);
    }
}
