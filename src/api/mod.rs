//! # Admin API
//!
//! Operational HTTP surface. It exposes metrics and engine health; tagging
//! requests do not go through it.
//!
//! ## Endpoints
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /api/v1/health` - Health check with engine statistics
//! - `GET /api/v1/info` - Build and topology information

pub mod handlers;
pub mod server;

// Re-export commonly used items
pub use handlers::AppState;
pub use server::{create_app, start_server};
