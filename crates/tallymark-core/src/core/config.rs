//! Engine configuration
//!
//! Every section has serde defaults so a partial TOML table is enough.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::routing::check_topology;
use crate::types::{Error, Result};

/// Default maximum byte length of namespace, bitmap and entity id fields
pub const DEFAULT_MAX_FIELD_LENGTH: usize = 128;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Background flush and reclamation
    pub maintenance: MaintenanceConfig,

    /// Queue and consumer topology
    pub routing: RoutingConfig,

    /// Request limits
    pub limits: LimitsConfig,
}

/// Maintenance scheduler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between flush ticks
    pub flush_interval_ms: u64,

    /// Dirty entries that trigger an early flush
    pub flush_batch_size: usize,

    /// Reclaim retired snapshots every this many flush cycles
    pub reclaim_every: u64,

    /// Attempts per flush before the batch is requeued
    pub flush_max_attempts: u32,

    /// Backoff before the first retry, doubled on each further retry
    pub flush_retry_backoff_ms: u64,
}

/// Queue topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Total number of operation queues
    pub total_queues: u32,

    /// Queues owned by each consumer thread
    pub queues_per_consumer: u32,

    /// Capacity of each queue before callers block
    pub queue_capacity: usize,
}

/// Request limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum byte length of each string field
    pub max_field_length: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1000,
            flush_batch_size: 1000,
            reclaim_every: 10,
            flush_max_attempts: 3,
            flush_retry_backoff_ms: 10,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            total_queues: 16,
            queues_per_consumer: 4,
            queue_capacity: 4096,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self { max_field_length: DEFAULT_MAX_FIELD_LENGTH }
    }
}

impl MaintenanceConfig {
    /// Flush tick interval
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Backoff before retry `attempt` (1-based)
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.flush_retry_backoff_ms.saturating_mul(factor))
    }
}

impl RoutingConfig {
    /// Number of consumer threads
    pub fn consumers(&self) -> u32 {
        self.total_queues / self.queues_per_consumer.max(1)
    }
}

impl EngineConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| Error::config(format!("Failed to parse engine config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        check_topology(self.routing.total_queues, self.routing.queues_per_consumer)
            .map_err(|e| Error::config(format!("Invalid queue topology: {}", e)))?;

        if self.routing.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be greater than zero"));
        }
        if self.maintenance.flush_interval_ms == 0 {
            return Err(Error::config("flush_interval_ms must be greater than zero"));
        }
        if self.maintenance.reclaim_every == 0 {
            return Err(Error::config("reclaim_every must be greater than zero"));
        }
        if self.maintenance.flush_max_attempts == 0 {
            return Err(Error::config("flush_max_attempts must be at least 1"));
        }
        // Field lengths are stored with a u16 prefix.
        if self.limits.max_field_length == 0 || self.limits.max_field_length > usize::from(u16::MAX) {
            return Err(Error::config(format!(
                "max_field_length must be between 1 and {}",
                u16::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.routing.consumers(), 4);
        assert_eq!(config.limits.max_field_length, 128);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [maintenance]
            flush_interval_ms = 50

            [routing]
            total_queues = 8
            queues_per_consumer = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.maintenance.flush_interval_ms, 50);
        assert_eq!(config.maintenance.reclaim_every, 10);
        assert_eq!(config.routing.consumers(), 4);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.routing.total_queues = 10;
        config.routing.queues_per_consumer = 4;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = EngineConfig::default();
        config.maintenance.reclaim_every = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.limits.max_field_length = 70_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_doubles() {
        let m = MaintenanceConfig { flush_retry_backoff_ms: 10, ..Default::default() };
        assert_eq!(m.retry_backoff(1), Duration::from_millis(10));
        assert_eq!(m.retry_backoff(2), Duration::from_millis(20));
        assert_eq!(m.retry_backoff(3), Duration::from_millis(40));
    }
}
