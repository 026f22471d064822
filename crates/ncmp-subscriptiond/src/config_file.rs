//! Configuration file support for ncmp-subscriptiond
//!
//! Loads and validates daemon configuration from TOML files.
//! Default location: /etc/ncmp/subscriptiond.toml

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use ncmp_subscription_common::{StaticPluginResolver, SubscriptionError, SubscriptionResult};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ncmp/subscriptiond.toml";

/// Timer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimersConfig {
    /// How long to wait for plugin replies before publishing what is known
    pub response_timeout_ms: u64,

    /// Maximum age of a cache entry before the sweeper evicts it
    #[serde(default = "default_cache_entry_ttl")]
    pub cache_entry_ttl_ms: u64,

    /// Sweeper period
    #[serde(default = "default_cache_sweep_interval")]
    pub cache_sweep_interval_ms: u64,
}

/// Message bus topic names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Client requests in
    #[serde(default = "default_ncmp_in")]
    pub ncmp_in: String,

    /// Client responses out
    #[serde(default = "default_ncmp_out")]
    pub ncmp_out: String,

    /// Requests to DMI plugins
    #[serde(default = "default_dmi_in")]
    pub dmi_in: String,

    /// Replies from DMI plugins
    #[serde(default = "default_dmi_out")]
    pub dmi_out: String,
}

/// In-process bus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-topic channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// CM handle ownership table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// CM handle id → DMI plugin name
    #[serde(default)]
    pub cm_handles: BTreeMap<String, String>,
}

/// Complete ncmp-subscriptiond configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default)]
    pub timers: TimersConfig,

    #[serde(default)]
    pub topics: TopicsConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,
}

// Default functions
fn default_response_timeout() -> u64 {
    30_000
}

fn default_cache_entry_ttl() -> u64 {
    600_000
}

fn default_cache_sweep_interval() -> u64 {
    60_000
}

fn default_ncmp_in() -> String {
    "subscription".to_string()
}

fn default_ncmp_out() -> String {
    "subscription-response".to_string()
}

fn default_dmi_in() -> String {
    "ncmp-dmi-cm-avc-subscription".to_string()
}

fn default_dmi_out() -> String {
    "dmi-ncmp-cm-avc-subscription".to_string()
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout(),
            cache_entry_ttl_ms: default_cache_entry_ttl(),
            cache_sweep_interval_ms: default_cache_sweep_interval(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            ncmp_in: default_ncmp_in(),
            ncmp_out: default_ncmp_out(),
            dmi_in: default_dmi_in(),
            dmi_out: default_dmi_out(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl SubscriptionConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> SubscriptionResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                SubscriptionError::invalid_config(
                    path.display().to_string(),
                    format!("failed to parse: {}", e),
                )
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(SubscriptionError::Io(e)),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> SubscriptionResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            SubscriptionError::invalid_config("config", format!("failed to serialize: {}", e))
        })?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get response timeout as Duration
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.timers.response_timeout_ms)
    }

    /// Get cache entry TTL as Duration
    pub fn cache_entry_ttl(&self) -> Duration {
        Duration::from_millis(self.timers.cache_entry_ttl_ms)
    }

    /// Get sweeper period as Duration
    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.timers.cache_sweep_interval_ms)
    }

    /// Build the CM handle resolver from the inventory table
    pub fn plugin_resolver(&self) -> StaticPluginResolver {
        self.inventory
            .cm_handles
            .iter()
            .map(|(handle, plugin)| (handle.as_str(), plugin.as_str()))
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> SubscriptionResult<()> {
        if self.timers.response_timeout_ms == 0 {
            return Err(SubscriptionError::invalid_config(
                "timers.response_timeout_ms",
                "must be > 0",
            ));
        }

        if self.timers.cache_entry_ttl_ms <= self.timers.response_timeout_ms {
            return Err(SubscriptionError::invalid_config(
                "timers.cache_entry_ttl_ms",
                "must be greater than timers.response_timeout_ms",
            ));
        }

        if self.timers.cache_sweep_interval_ms == 0 {
            return Err(SubscriptionError::invalid_config(
                "timers.cache_sweep_interval_ms",
                "must be > 0",
            ));
        }

        if self.bus.channel_capacity == 0 {
            return Err(SubscriptionError::invalid_config(
                "bus.channel_capacity",
                "must be > 0",
            ));
        }

        for (field, topic) in [
            ("topics.ncmp_in", &self.topics.ncmp_in),
            ("topics.ncmp_out", &self.topics.ncmp_out),
            ("topics.dmi_in", &self.topics.dmi_in),
            ("topics.dmi_out", &self.topics.dmi_out),
        ] {
            if topic.trim().is_empty() {
                return Err(SubscriptionError::invalid_config(field, "must not be empty"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ncmp_subscription_common::PluginResolver;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SubscriptionConfig::default();
        assert_eq!(config.timers.response_timeout_ms, 30_000);
        assert_eq!(config.topics.ncmp_in, "subscription");
        assert_eq!(config.topics.dmi_out, "dmi-ncmp-cm-avc-subscription");
        assert_eq!(config.bus.channel_capacity, 1024);
        assert!(config.inventory.cm_handles.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let config = SubscriptionConfig::default();
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache_entry_ttl(), Duration::from_secs(600));
        assert_eq!(config.cache_sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[timers]
response_timeout_ms = 5000

[topics]
ncmp_out = "responses"

[inventory.cm_handles]
h1 = "dmi-a"
h2 = "dmi-b"
"#;
        let config: SubscriptionConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timers.response_timeout_ms, 5000);
        assert_eq!(config.timers.cache_entry_ttl_ms, 600_000);
        assert_eq!(config.topics.ncmp_out, "responses");
        assert_eq!(config.topics.ncmp_in, "subscription");

        let resolver = config.plugin_resolver();
        assert_eq!(resolver.len(), 2);
        assert_eq!(resolver.resolve_plugin("h2").as_deref(), Some("dmi-b"));
    }

    #[test]
    fn test_timers_section_requires_timeout() {
        let toml_str = r#"
[timers]
cache_entry_ttl_ms = 90000
"#;
        assert!(toml::from_str::<SubscriptionConfig>(toml_str).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = SubscriptionConfig::default();
        config.timers.response_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_ttl_not_above_timeout() {
        let mut config = SubscriptionConfig::default();
        config.timers.cache_entry_ttl_ms = config.timers.response_timeout_ms;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache_entry_ttl_ms"));
    }

    #[test]
    fn test_validate_rejects_empty_topic() {
        let mut config = SubscriptionConfig::default();
        config.topics.dmi_in = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("topics.dmi_in"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = SubscriptionConfig::default();
        config.bus.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_nonexistent_file_defaults() {
        let config = SubscriptionConfig::load_or_default("/nonexistent/path.toml").unwrap();
        assert_eq!(config, SubscriptionConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timers]\nresponse_timeout_ms = 1000\ncache_entry_ttl_ms = 2000").unwrap();

        let config = SubscriptionConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.response_timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[timers\nresponse_timeout_ms = ").unwrap();

        assert!(SubscriptionConfig::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriptiond.toml");
        let mut config = SubscriptionConfig::default();
        config
            .inventory
            .cm_handles
            .insert("h1".to_string(), "dmi-a".to_string());

        config.save(&path).unwrap();

        assert_eq!(SubscriptionConfig::load_or_default(&path).unwrap(), config);
    }
}
