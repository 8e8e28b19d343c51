//! Engine configuration, logging and construction

/// Logging macros
pub mod logging;

/// Engine configuration
pub mod config;

/// Storage-backed engine construction
pub mod factory;

pub use config::{EngineConfig, LimitsConfig, MaintenanceConfig, RoutingConfig};
pub use factory::{open_engine, ConfiguredEngine, StorageConfig, StorageType};
