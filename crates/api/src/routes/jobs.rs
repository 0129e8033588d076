use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// POST   /                        -> submit_job
/// GET    /{id}                    -> get_job
/// DELETE /{id}                    -> delete_job
/// GET    /{id}/files/{filename}   -> download_file
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(jobs::submit_job))
        .route("/{id}", get(jobs::get_job).delete(jobs::delete_job))
        .route("/{id}/files/{filename}", get(jobs::download_file))
}

/// `POST /upload -> upload_job`, mounted at `/jobs` under the upload timeout.
pub fn upload_router() -> Router<AppState> {
    Router::new().route("/upload", post(jobs::upload_job))
}
