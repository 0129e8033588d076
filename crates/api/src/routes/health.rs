use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Jobs still processing.
    pub active_jobs: usize,
    /// Free slots in the dispatch queue.
    pub queued_capacity: usize,
}

/// GET /health -- returns service status and job load.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let queued_capacity = state.dispatcher.queued_capacity();
    let status = if queued_capacity > 0 { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        active_jobs: state.registry.active_count().await,
        queued_capacity,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
