//! Service configuration schema and loader.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::queue::MAX_RETENTION_SECS;
use crate::ports::Consistency;
use crate::store::StoreSettings;

/// Settings of one queue service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Partitions assumed when the queue directory does not answer.
    #[serde(default = "default_one")]
    pub default_partitions: u32,

    /// Shards assumed when the queue directory does not answer.
    #[serde(default = "default_one")]
    pub default_shards: u32,

    /// Upper bound of `max_messages` on one receive.
    #[serde(default = "default_max_receive_messages")]
    pub max_receive_messages: usize,

    #[serde(default = "default_max_wait_time_secs")]
    pub max_wait_time_secs: u64,

    #[serde(default = "default_one_u64")]
    pub min_wait_time_secs: u64,

    /// Whether receives may ask for a wait time at all.
    #[serde(default = "default_true")]
    pub long_poll_enabled: bool,

    #[serde(default = "default_visibility_timeout_secs")]
    pub default_visibility_timeout_secs: u64,

    #[serde(default = "default_max_visibility_timeout_secs")]
    pub max_visibility_timeout_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u32,

    /// `get_messages` with more ids than this uses range reads.
    #[serde(default = "default_bulk_get_threshold")]
    pub bulk_get_threshold: usize,

    #[serde(default = "default_bulk_range_limit")]
    pub bulk_range_limit: usize,

    /// Window applied when a peek walks onto an adjacent partition.
    #[serde(default = "default_peek_walk_window_days")]
    pub peek_walk_window_days: u64,

    /// Consistency level for every store operation.
    #[serde(default)]
    pub consistency: Consistency,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_partitions: default_one(),
            default_shards: default_one(),
            max_receive_messages: default_max_receive_messages(),
            max_wait_time_secs: default_max_wait_time_secs(),
            min_wait_time_secs: default_one_u64(),
            long_poll_enabled: true,
            default_visibility_timeout_secs: default_visibility_timeout_secs(),
            max_visibility_timeout_secs: default_max_visibility_timeout_secs(),
            max_delay_secs: default_max_delay_secs(),
            bulk_get_threshold: default_bulk_get_threshold(),
            bulk_range_limit: default_bulk_range_limit(),
            peek_walk_window_days: default_peek_walk_window_days(),
            consistency: Consistency::default(),
        }
    }
}

// --- Defaults ---

fn default_one() -> u32 {
    1
}
fn default_one_u64() -> u64 {
    1
}
fn default_true() -> bool {
    true
}
fn default_max_receive_messages() -> usize {
    10
}
fn default_max_wait_time_secs() -> u64 {
    20
}
fn default_visibility_timeout_secs() -> u64 {
    30
}
fn default_max_visibility_timeout_secs() -> u64 {
    43_200
}
fn default_max_delay_secs() -> u32 {
    900
}
fn default_bulk_get_threshold() -> usize {
    100
}
fn default_bulk_range_limit() -> usize {
    200
}
const SECS_PER_DAY: u64 = 24 * 60 * 60;

fn default_peek_walk_window_days() -> u64 {
    14
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ServiceConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_partitions == 0 {
            return Err(ConfigError::Invalid("default_partitions must be > 0".into()));
        }
        if self.default_shards == 0 {
            return Err(ConfigError::Invalid("default_shards must be > 0".into()));
        }
        if self.max_receive_messages == 0 {
            return Err(ConfigError::Invalid("max_receive_messages must be > 0".into()));
        }
        if self.min_wait_time_secs == 0 || self.min_wait_time_secs > self.max_wait_time_secs {
            return Err(ConfigError::Invalid(format!(
                "min_wait_time_secs ({}) must be in 1..=max_wait_time_secs ({})",
                self.min_wait_time_secs, self.max_wait_time_secs
            )));
        }
        if self.default_visibility_timeout_secs > self.max_visibility_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "default_visibility_timeout_secs ({}) must be <= max_visibility_timeout_secs ({})",
                self.default_visibility_timeout_secs, self.max_visibility_timeout_secs
            )));
        }
        if self.bulk_range_limit == 0 {
            return Err(ConfigError::Invalid("bulk_range_limit must be > 0".into()));
        }
        let Some(window_secs) = self.peek_walk_window_days.checked_mul(SECS_PER_DAY) else {
            return Err(ConfigError::Invalid(format!(
                "peek_walk_window_days ({}) is too large",
                self.peek_walk_window_days
            )));
        };
        // live ordering keys lie in [now - retention, now + delay]
        let reach = u64::from(MAX_RETENTION_SECS).max(u64::from(self.max_delay_secs));
        if window_secs < reach {
            return Err(ConfigError::Invalid(format!(
                "peek_walk_window_days ({}) must cover {reach}s of retention and delay",
                self.peek_walk_window_days
            )));
        }
        Ok(())
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            consistency: self.consistency,
            default_partitions: self.default_partitions,
            default_shards: self.default_shards,
            max_delay_secs: self.max_delay_secs,
            bulk_get_threshold: self.bulk_get_threshold,
            bulk_range_limit: self.bulk_range_limit,
            peek_walk_window: Duration::from_secs(
                self.peek_walk_window_days.saturating_mul(SECS_PER_DAY),
            ),
        }
    }
}

/// Load a `ServiceConfig` from a YAML file path.
pub fn load_from_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Load a `ServiceConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}
