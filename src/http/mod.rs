//! HTTP surface: a small axum router in front of the [`Agent`].
//!
//! ```text
//! POST /api/request   {id, query} → {id, answer, reasoning, sources}
//! GET  /api/health    provider / model / search status
//! ```
//!
//! [`serve`] runs until the [`CancellationToken`] fires, then drains
//! in-flight requests through axum's graceful shutdown.

mod api;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::Agent;
use crate::error::AppError;

/// Router state injected into every handler via [`axum::extract::State`].
#[derive(Clone)]
pub(crate) struct ApiState {
    pub agent: Arc<Agent>,
}

pub fn build_router(agent: Arc<Agent>) -> Router {
    Router::new()
        .route("/api/request", post(api::request))
        .route("/api/health",  get(api::health))
        .with_state(ApiState { agent })
}

/// Bind `bind_addr` and serve until `shutdown` is cancelled.
pub async fn serve(bind_addr: &str, agent: Arc<Agent>, shutdown: CancellationToken) -> Result<(), AppError> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;
    serve_on(listener, agent, shutdown).await
}

/// Serve on an already-bound listener (lets callers bind port 0).
pub async fn serve_on(listener: TcpListener, agent: Arc<Agent>, shutdown: CancellationToken) -> Result<(), AppError> {
    let local = listener
        .local_addr()
        .map_err(|e| AppError::Server(format!("listener has no local address: {e}")))?;
    info!(bind = %local, "http server listening");

    axum::serve(listener, build_router(agent))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("http server error: {e}")))?;

    info!("http server shut down");
    Ok(())
}
