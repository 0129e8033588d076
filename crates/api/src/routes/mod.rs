pub mod health;
pub mod jobs;
pub mod legacy;
pub mod models;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /jobs                              submit from URL (POST)
/// /jobs/{id}                         status (GET), cleanup (DELETE)
/// /jobs/{id}/files/{filename}        download one output (GET)
///
/// /models                            installed models per family (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/jobs", jobs::router())
        .nest("/models", models::router())
}

/// Multipart upload routes under `/api/v1`.
///
/// ```text
/// /jobs/upload                       submit multipart upload (POST)
/// ```
pub fn api_upload_routes() -> Router<AppState> {
    Router::new().nest("/jobs", jobs::upload_router())
}
