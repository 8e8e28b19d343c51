//! Process configuration and errors

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{Config, LogFormat, LoggingConfig, MetricsConfig, ServerConfig};
pub use error::{Error, Result};
