//! Probe and metrics endpoints.
//!
//! - `GET /healthz` - process is up
//! - `GET /readyz` - the HostedCluster watch is established
//! - `GET /metrics` - Prometheus text exposition

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::info;

use crate::error::ControllerError;
use crate::metrics::Metrics;

/// State shared between the watcher and the HTTP handlers
pub struct ServerState {
    pub metrics: Arc<Metrics>,
    ready: AtomicBool,
}

impl ServerState {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            ready: AtomicBool::new(false),
        }
    }

    /// Mark the controller ready to serve
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn readyz(State(state): State<Arc<ServerState>>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics(State(state): State<Arc<ServerState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Serve the probe and metrics endpoints until the listener fails
pub async fn serve(addr: SocketAddr, state: Arc<ServerState>) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Server(format!("failed to bind {addr}: {e}")))?;
    info!("Probe and metrics server listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ControllerError::Server(e.to_string()))
}
