//! Configuration management for the analytics engine
//!
//! Provides configuration file support with TOML format and sensible
//! defaults matching the reference behavior: 30-minute local cache TTL,
//! 100-entry local bound, 15-minute distributed TTL, 5-minute sweeps and
//! a 450ms critical-path deadline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Cache manager tuning
    #[serde(default)]
    pub cache: CacheConfig,

    /// Query builder and executor tuning
    #[serde(default)]
    pub query: QueryConfig,

    /// Insight engine thresholds
    #[serde(default)]
    pub insight: InsightConfig,

    /// Distributed cache connectivity
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Cache manager configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Local-tier TTL in seconds
    #[serde(default = "default_local_ttl_secs")]
    pub local_ttl_secs: u64,

    /// Maximum local-tier entries after a sweep
    #[serde(default = "default_local_max_entries")]
    pub local_max_entries: usize,

    /// Distributed-tier TTL in seconds
    ///
    /// Deliberately shorter than the local TTL: the distributed tier serves
    /// cross-process sharing, not single-process repeat hits.
    #[serde(default = "default_distributed_ttl_secs")]
    pub distributed_ttl_secs: u64,

    /// Interval between local sweeps, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// Query builder and executor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Hard row cap per request; excess rows are truncated without pagination
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Critical-path deadline in milliseconds
    #[serde(default = "default_critical_deadline_ms")]
    pub critical_deadline_ms: u64,

    /// Measures whose presence keeps a request on the critical path
    #[serde(default = "default_critical_measures")]
    pub critical_measures: Vec<String>,

    /// Dimensions whose presence keeps a request on the critical path
    #[serde(default = "default_critical_dimensions")]
    pub critical_dimensions: Vec<String>,
}

/// Insight engine thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InsightConfig {
    /// Minimum |slope| for a trend insight to be reported
    #[serde(default = "default_trend_slope_threshold")]
    pub trend_slope_threshold: f64,

    /// Standard deviations beyond which a value is anomalous
    #[serde(default = "default_anomaly_sigma")]
    pub anomaly_sigma: f64,

    /// Minimum |r| for a correlation insight to be reported
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,
}

/// Distributed cache connectivity
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis server URL
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Timeout for individual commands, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

// Default value functions
fn default_local_ttl_secs() -> u64 { 30 * 60 }
fn default_local_max_entries() -> usize { 100 }
fn default_distributed_ttl_secs() -> u64 { 15 * 60 }
fn default_sweep_interval_secs() -> u64 { 5 * 60 }
fn default_max_rows() -> usize { 1000 }
fn default_critical_deadline_ms() -> u64 { 450 }
fn default_critical_measures() -> Vec<String> {
    vec!["revenue".to_string(), "orders".to_string()]
}
fn default_critical_dimensions() -> Vec<String> {
    vec!["time".to_string(), "tenant".to_string()]
}
fn default_trend_slope_threshold() -> f64 { 0.1 }
fn default_anomaly_sigma() -> f64 { 2.5 }
fn default_correlation_threshold() -> f64 { 0.7 }
fn default_redis_url() -> String { "redis://127.0.0.1:6379".to_string() }
fn default_command_timeout_ms() -> u64 { 1000 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl_secs: default_local_ttl_secs(),
            local_max_entries: default_local_max_entries(),
            distributed_ttl_secs: default_distributed_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            critical_deadline_ms: default_critical_deadline_ms(),
            critical_measures: default_critical_measures(),
            critical_dimensions: default_critical_dimensions(),
        }
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            trend_slope_threshold: default_trend_slope_threshold(),
            anomaly_sigma: default_anomaly_sigma(),
            correlation_threshold: default_correlation_threshold(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig =
            toml::from_str(&contents).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration bounds
    pub fn validate(&self) -> Result<()> {
        if self.cache.local_max_entries == 0 {
            return Err(Error::Configuration(
                "cache.local_max_entries must be greater than 0".to_string(),
            ));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(Error::Configuration(
                "cache.sweep_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.query.max_rows == 0 {
            return Err(Error::Configuration(
                "query.max_rows must be greater than 0".to_string(),
            ));
        }
        if self.query.critical_deadline_ms == 0 {
            return Err(Error::Configuration(
                "query.critical_deadline_ms must be greater than 0".to_string(),
            ));
        }
        if self.redis.url.is_empty() {
            return Err(Error::Configuration("redis.url cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Local-tier TTL as a [`Duration`]
    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.local_ttl_secs)
    }

    /// Distributed-tier TTL as a [`Duration`]
    pub fn distributed_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.distributed_ttl_secs)
    }

    /// Sweep interval as a [`Duration`]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }

    /// Critical-path deadline as a [`Duration`]
    pub fn critical_deadline(&self) -> Duration {
        Duration::from_millis(self.query.critical_deadline_ms)
    }
}
