//! Configuration management for tallymark
//!
//! Defaults, then `tallymark.toml` when present, then `TM_*` environment
//! overrides, then validation. CLI flags are applied on top by the binary.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tallymark_core::{EngineConfig, StorageConfig, StorageType};

/// Config file read by [`Config::load`] when it exists
pub const DEFAULT_CONFIG_FILE: &str = "tallymark.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing store
    pub storage: StorageConfig,

    /// Engine tuning
    pub engine: EngineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics and the admin HTTP surface
    pub metrics: MetricsConfig,

    /// Admin server configuration
    pub server: ServerConfig,
}

/// Log line layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line compact output
    #[default]
    Compact,
    /// Default `tracing-subscriber` layout with targets
    Full,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            other => Err(Error::config(format!("Invalid log format: {}. Valid options: compact, full", other))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    pub level: String,

    /// Output layout
    pub format: LogFormat,
}

/// Metrics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve `/metrics` and the admin endpoints
    pub enable_http: bool,

    /// How often engine statistics are copied into the registry
    pub collection_interval_ms: u64,
}

/// Admin server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Admin HTTP bind address
    pub http_addr: SocketAddr,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable_http: true,
            collection_interval_ms: 1000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl MetricsConfig {
    /// Sampling interval
    pub fn collection_interval(&self) -> Duration {
        Duration::from_millis(self.collection_interval_ms)
    }
}

impl Config {
    /// Load configuration from environment variables and config file
    pub fn load() -> Result<Self> {
        let mut config = if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            Config::default()
        };

        // Override with environment variables
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply `TM_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        // Storage overrides
        if let Some(data_dir) = lookup("TM_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Some(storage_type) = lookup("TM_STORAGE_TYPE") {
            self.storage.storage_type = parse_storage_type(&storage_type)?;
        }

        // Logging overrides
        if let Some(level) = lookup("TM_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("TM_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }

        // Engine overrides
        if let Some(v) = lookup("TM_FLUSH_INTERVAL_MS") {
            self.engine.maintenance.flush_interval_ms = parse_number("TM_FLUSH_INTERVAL_MS", &v)?;
        }

        if let Some(v) = lookup("TM_FLUSH_BATCH_SIZE") {
            self.engine.maintenance.flush_batch_size = parse_number("TM_FLUSH_BATCH_SIZE", &v)?;
        }

        if let Some(v) = lookup("TM_RECLAIM_EVERY") {
            self.engine.maintenance.reclaim_every = parse_number("TM_RECLAIM_EVERY", &v)?;
        }

        if let Some(v) = lookup("TM_TOTAL_QUEUES") {
            self.engine.routing.total_queues = parse_number("TM_TOTAL_QUEUES", &v)?;
        }

        if let Some(v) = lookup("TM_QUEUES_PER_CONSUMER") {
            self.engine.routing.queues_per_consumer = parse_number("TM_QUEUES_PER_CONSUMER", &v)?;
        }

        if let Some(v) = lookup("TM_MAX_FIELD_LENGTH") {
            self.engine.limits.max_field_length = parse_number("TM_MAX_FIELD_LENGTH", &v)?;
        }

        // Server overrides
        if let Some(addr) = lookup("TM_HTTP_ADDR") {
            self.server.http_addr = addr.parse()
                .map_err(|e| Error::config(format!("Invalid HTTP address: {}", e)))?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        // Validate log level
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        if self.metrics.enable_http && self.metrics.collection_interval_ms == 0 {
            return Err(Error::config("collection_interval_ms must be greater than zero"));
        }

        if self.storage.storage_type == StorageType::Lmdb && self.storage.map_size < 1024 * 1024 {
            return Err(Error::config("LMDB map size too small (minimum 1MB)"));
        }

        let cores = num_cpus::get();
        let consumers = self.engine.routing.consumers() as usize;
        if consumers > cores {
            tracing::warn!(consumers, cores, "more partition consumers than CPU cores");
        }

        Ok(())
    }
}

/// Parse a storage backend name
pub fn parse_storage_type(value: &str) -> Result<StorageType> {
    value.parse().map_err(|_| {
        Error::config(format!("Invalid storage type: {}. Valid options: lmdb, memory", value))
    })
}

fn parse_number<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| Error::config(format!("Invalid {}: {}", name, e)))
}
