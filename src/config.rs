//! Configuration file support
//!
//! TOML configuration with environment variable overrides and sensible
//! defaults. A config file is entirely optional: every field defaults,
//! and metric definitions can equally be built in code.
//!
//! ```toml
//! namespace = "app"
//!
//! [redis]
//! url = "redis://127.0.0.1:6379/0"
//! pool_size = 32
//! command_timeout_ms = 500
//!
//! [[metrics]]
//! name = "visits"
//! variant = "counter"
//! resolution = "day"
//!
//! [[metrics]]
//! name = "signups"
//! variant = "unique"
//! resolution = "month"
//! ```
//!
//! Environment overrides use the `REDISTAT_` prefix and win over file
//! values: `REDISTAT_URL`, `REDISTAT_NAMESPACE`, `REDISTAT_POOL_SIZE`,
//! `REDISTAT_COMMAND_TIMEOUT_MS`.

use crate::error::{Error, Result};
use crate::metric::MetricConfig;
use crate::store::redis::{RedisConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level configuration for a Redis-backed analytics client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Optional prefix applied to every store key.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Redis connection settings.
    #[serde(default)]
    pub redis: RedisSettings,

    /// Metric definitions available through [`StatsConfig::metric`].
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            redis: RedisSettings::default(),
            metrics: Vec::new(),
        }
    }
}

/// Redis connection settings as they appear in the config file.
///
/// Durations are carried as integer milliseconds so the file stays
/// plain TOML; [`StatsConfig::redis_config`] converts them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisSettings {
    /// Server URL.
    #[serde(default = "default_url")]
    pub url: String,

    /// Maximum in-flight operations.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connect timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Per-operation timeout in milliseconds.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Retry attempts for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Connect over TLS (requires the `redis-tls` feature).
    #[serde(default)]
    pub tls_enabled: bool,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            max_retries: default_max_retries(),
            tls_enabled: false,
        }
    }
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_pool_size() -> u32 {
    16
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

fn default_command_timeout_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

impl StatsConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|err| {
            Error::InvalidConfiguration(format!("cannot read {}: {err}", path.display()))
        })?;
        let config: StatsConfig = toml::from_str(&contents).map_err(|err| {
            Error::InvalidConfiguration(format!("cannot parse {}: {err}", path.display()))
        })?;
        config.validate()?;
        info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, no file involved.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `REDISTAT_*` environment variables over the current values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("REDISTAT_URL") {
            self.redis.url = url;
        }
        if let Ok(namespace) = std::env::var("REDISTAT_NAMESPACE") {
            self.namespace = if namespace.is_empty() {
                None
            } else {
                Some(namespace)
            };
        }
        if let Ok(value) = std::env::var("REDISTAT_POOL_SIZE") {
            match value.parse() {
                Ok(size) => self.redis.pool_size = size,
                Err(_) => warn!("ignoring non-numeric REDISTAT_POOL_SIZE {value:?}"),
            }
        }
        if let Ok(value) = std::env::var("REDISTAT_COMMAND_TIMEOUT_MS") {
            match value.parse() {
                Ok(ms) => self.redis.command_timeout_ms = ms,
                Err(_) => warn!("ignoring non-numeric REDISTAT_COMMAND_TIMEOUT_MS {value:?}"),
            }
        }
    }

    /// Check the whole configuration, metric definitions included.
    pub fn validate(&self) -> Result<()> {
        if let Some(namespace) = &self.namespace {
            if namespace.is_empty() {
                return Err(Error::InvalidConfiguration(
                    "namespace cannot be empty; omit it instead".to_string(),
                ));
            }
            if namespace.chars().any(char::is_whitespace) {
                return Err(Error::InvalidConfiguration(format!(
                    "namespace {namespace:?} contains whitespace"
                )));
            }
        }

        self.redis_config()
            .validate()
            .map_err(Error::InvalidConfiguration)?;

        let mut seen = HashSet::new();
        for metric in &self.metrics {
            metric.validate()?;
            if !seen.insert(metric.name()) {
                return Err(Error::InvalidConfiguration(format!(
                    "metric {:?} is defined twice",
                    metric.name()
                )));
            }
        }
        Ok(())
    }

    /// Connection settings in the form the Redis store consumes.
    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig::with_url(self.redis.url.clone())
            .pool_size(self.redis.pool_size)
            .connection_timeout(Duration::from_millis(self.redis.connection_timeout_ms))
            .command_timeout(Duration::from_millis(self.redis.command_timeout_ms))
            .retry_policy(RetryPolicy {
                max_retries: self.redis.max_retries,
                ..RetryPolicy::default()
            })
            .tls(self.redis.tls_enabled)
    }

    /// Look up a metric definition by name.
    pub fn metric(&self, name: &str) -> Option<&MetricConfig> {
        self.metrics.iter().find(|metric| metric.name() == name)
    }

    /// Write the configuration out as TOML.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self).map_err(|err| {
            Error::InvalidConfiguration(format!("cannot serialize configuration: {err}"))
        })?;
        std::fs::write(path, contents).map_err(|err| {
            Error::InvalidConfiguration(format!("cannot write {}: {err}", path.display()))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Resolution;
    use crate::types::Variant;

    #[test]
    fn defaults_are_valid() {
        let config = StatsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(config.redis.pool_size, 16);
        assert!(config.metrics.is_empty());
    }

    #[test]
    fn files_parse_with_partial_settings() {
        let toml = r#"
            namespace = "app"

            [redis]
            url = "redis://cache.internal:6380/1"

            [[metrics]]
            name = "visits"
            variant = "counter"
            resolution = "day"

            [[metrics]]
            name = "signups"
            variant = "unique"
        "#;
        let config: StatsConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.namespace.as_deref(), Some("app"));
        assert_eq!(config.redis.url, "redis://cache.internal:6380/1");
        assert_eq!(config.redis.pool_size, 16);

        let visits = config.metric("visits").unwrap();
        assert_eq!(visits.variant(), Variant::Counter);
        assert_eq!(visits.resolution(), Some(Resolution::Day));
        assert_eq!(config.metric("signups").unwrap().resolution(), None);
        assert!(config.metric("absent").is_none());
    }

    #[test]
    fn duplicate_metric_names_are_rejected() {
        let toml = r#"
            [[metrics]]
            name = "visits"
            variant = "counter"

            [[metrics]]
            name = "visits"
            variant = "unique"
        "#;
        let config: StatsConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn bad_metric_names_fail_validation() {
        let toml = r#"
            [[metrics]]
            name = "vis:its"
            variant = "counter"
        "#;
        let config: StatsConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_win_and_skip_garbage() {
        // One test owns all REDISTAT_* variables; parallel tests would
        // race on the shared process environment otherwise.
        std::env::set_var("REDISTAT_URL", "redis://override.internal:7000");
        std::env::set_var("REDISTAT_POOL_SIZE", "8");
        std::env::set_var("REDISTAT_COMMAND_TIMEOUT_MS", "250");

        let config = StatsConfig::from_env();
        assert_eq!(config.redis.url, "redis://override.internal:7000");
        assert_eq!(config.redis.pool_size, 8);
        assert_eq!(config.redis.command_timeout_ms, 250);

        std::env::set_var("REDISTAT_POOL_SIZE", "lots");
        let config = StatsConfig::from_env();
        assert_eq!(config.redis.pool_size, 16);

        std::env::remove_var("REDISTAT_URL");
        std::env::remove_var("REDISTAT_POOL_SIZE");
        std::env::remove_var("REDISTAT_COMMAND_TIMEOUT_MS");
    }

    #[test]
    fn configs_round_trip_through_files() {
        let mut config = StatsConfig::default();
        config.namespace = Some("app".to_string());
        config.redis.pool_size = 4;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redistat.toml");
        config.save_to_file(&path).unwrap();

        let loaded = StatsConfig::from_file(&path).unwrap();
        assert_eq!(loaded.namespace.as_deref(), Some("app"));
        assert_eq!(loaded.redis.pool_size, 4);
    }

    #[test]
    fn missing_files_error_with_the_path() {
        let err = StatsConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("not/here.toml"));
    }

    #[test]
    fn redis_settings_convert_to_connection_config() {
        let mut config = StatsConfig::default();
        config.redis.command_timeout_ms = 250;
        config.redis.max_retries = 1;

        let redis = config.redis_config();
        assert_eq!(redis.command_timeout, Duration::from_millis(250));
        assert_eq!(redis.retry_policy.max_retries, 1);
    }
}
