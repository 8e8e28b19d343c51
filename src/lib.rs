//! Tallymark - entity tagging with bucketed event counts
//!
//! This crate hosts the process-level concerns around `tallymark-core`:
//! configuration loading, logging, Prometheus metrics and the admin HTTP
//! server used by the `tallymark` binary.
#![warn(missing_docs)]

// Configure global allocator for maximum performance
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

// Core foundational modules
pub mod core;

// Main functional modules
pub mod api;
pub mod system;

// Re-export commonly used items for convenience
pub use crate::core::{Config, Error, Result};
pub use tallymark_core as engine;

use crate::core::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Build the log filter: `RUST_LOG` when set, otherwise `logging.level`
pub fn log_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&logging.level)
            .map_err(|e| Error::config(format!("Invalid log level {}: {}", logging.level, e))),
    }
}

/// Initialize tracing for the process
pub fn init(logging: &LoggingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(log_filter(logging)?);
    let installed = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Full => builder.try_init(),
    };
    installed.map_err(|e| Error::config(format!("Failed to install logger: {}", e)))?;

    tracing::info!("Initializing {} v{}", NAME, VERSION);
    Ok(())
}
