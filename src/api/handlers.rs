//! HTTP request handlers for the admin API

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use tallymark_core::{ConfiguredEngine, EngineStats};

use crate::system::metrics::{self, Metrics};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    /// The running engine
    pub engine: Arc<ConfiguredEngine>,
    /// Registered metrics, when enabled
    pub metrics: Option<&'static Metrics>,
    /// Process start time
    pub started: Instant,
}

impl AppState {
    /// State over `engine` with the global metrics, if initialised
    pub fn new(engine: Arc<ConfiguredEngine>) -> Self {
        Self { engine, metrics: Metrics::global(), started: Instant::now() }
    }
}

/// Health check body
#[derive(Serialize)]
pub struct HealthResponse {
    /// `healthy` while the engine accepts work, `stopped` otherwise
    pub status: &'static str,
    /// Seconds since start
    pub uptime_secs: u64,
    /// Crate version
    pub version: &'static str,
    /// Engine statistics
    pub stats: EngineStats,
}

/// Info body
#[derive(Serialize)]
pub struct InfoResponse {
    /// Crate name
    pub name: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Storage backend
    pub storage_type: String,
    /// Partition consumers
    pub consumers: u32,
    /// Operation queues
    pub total_queues: u32,
    /// Maximum field length in bytes
    pub max_field_length: usize,
    /// Logical CPUs on this host
    pub cpus: usize,
}

/// Engine health and statistics
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let stats = state.engine.stats();
    let (code, status) = if stats.running {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "stopped")
    };
    (
        code,
        Json(HealthResponse {
            status,
            uptime_secs: state.started.elapsed().as_secs(),
            version: crate::VERSION,
            stats,
        }),
    )
}

/// Build and topology information
pub async fn system_info(State(state): State<AppState>) -> Json<InfoResponse> {
    let config = state.engine.config();
    Json(InfoResponse {
        name: crate::NAME,
        version: crate::VERSION,
        storage_type: format!("{:?}", state.engine.storage_type()).to_lowercase(),
        consumers: config.routing.consumers(),
        total_queues: config.routing.total_queues,
        max_field_length: config.limits.max_field_length,
        cpus: num_cpus::get(),
    })
}

/// Prometheus scrape endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    let Some(m) = state.metrics else {
        return Err(StatusCode::NOT_FOUND);
    };
    m.observe(&state.engine.stats());
    metrics::collect_metrics().map_err(|e| {
        tracing::error!(error = %e, "failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallymark_core::{open_engine, EngineConfig, StorageConfig, StorageType};

    fn state() -> AppState {
        let storage = StorageConfig { storage_type: StorageType::Memory, ..StorageConfig::default() };
        let engine = open_engine(&storage, EngineConfig::default()).unwrap();
        AppState { engine: Arc::new(engine), metrics: None, started: Instant::now() }
    }

    #[test]
    fn health_reports_running_engine() {
        let state = state();
        state.engine.add("ns", "b", "e");
        let (code, Json(body)) = tokio_test::block_on(health_check(State(state.clone())));
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        assert_eq!(body.stats.adds, 1);

        state.engine.shutdown().unwrap();
        let (code, Json(body)) = tokio_test::block_on(health_check(State(state)));
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "stopped");
    }

    #[test]
    fn info_describes_topology() {
        let Json(info) = tokio_test::block_on(system_info(State(state())));
        assert_eq!(info.storage_type, "memory");
        assert_eq!(info.consumers, 4);
        assert_eq!(info.total_queues, 16);
        assert_eq!(info.max_field_length, 128);
    }

    #[test]
    fn metrics_without_registry_is_not_found() {
        let result = tokio_test::block_on(metrics_handler(State(state())));
        assert_eq!(result.unwrap_err(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn metrics_scrape_reflects_engine() {
        let mut state = state();
        state.metrics = Some(metrics::init_registry().unwrap());
        state.engine.add("ns", "b", "e");
        let body = tokio_test::block_on(metrics_handler(State(state))).unwrap();
        assert!(body.contains("tm_adds_total"));
        assert!(body.contains("tm_flush_cycles"));
    }
}
