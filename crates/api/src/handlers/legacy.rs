//! Root-level routes kept for existing clients.
//!
//! Same behaviour as the `/api/v1` handlers, but with bare payloads:
//! `{"job_id"}` on submit, the raw job state on status, and
//! `{"status": "not_found"}` for unknown jobs.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use mixbuster_core::request::require_field;

use super::jobs::{cleanup_job, dispatch, read_upload, serve_file, JobAccepted};
use super::models::installed_models;
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub job_id: Option<String>,
}

/// POST /process
pub async fn process(State(state): State<AppState>, multipart: Multipart) -> AppResult<Response> {
    let request = read_upload(&state, multipart).await?;
    let job_id = dispatch(&state, request).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })).into_response())
}

/// GET /status/{id}
pub async fn status(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    match state.registry.get(&job_id).await {
        Some(job) => Json(job).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "status": "not_found" }))).into_response(),
    }
}

/// GET /download/{id}/{filename}
pub async fn download(
    State(state): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> AppResult<Response> {
    serve_file(&state, &job_id, &filename).await
}

/// POST /cleanup
pub async fn cleanup(
    State(state): State<AppState>,
    Json(input): Json<CleanupRequest>,
) -> AppResult<impl IntoResponse> {
    let job_id = require_field("job_id", input.job_id)?;
    cleanup_job(&state, &job_id).await?;
    Ok(Json(json!({ "message": "Files removed." })))
}

/// GET /models
pub async fn models(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(installed_models(&state).await?))
}
