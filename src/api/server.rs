//! HTTP server for the admin API

use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use crate::core::{Error, Result};

/// Creates the admin router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/v1/health", get(handlers::health_check))
        .route("/api/v1/info", get(handlers::system_info))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serve the admin API on `addr` until `shutdown` resolves
pub async fn start_server<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Admin server listening on http://{}", addr);
    tracing::info!("Health check available at http://{}/api/v1/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::server(format!("admin server failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use tallymark_core::{open_engine, EngineConfig, StorageConfig, StorageType};

    #[tokio::test]
    async fn server_stops_on_shutdown_signal() {
        let storage = StorageConfig { storage_type: StorageType::Memory, ..StorageConfig::default() };
        let engine = open_engine(&storage, EngineConfig::default()).unwrap();
        let state = AppState { engine: Arc::new(engine), metrics: None, started: Instant::now() };

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = tokio::spawn(start_server(addr, state, async {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
