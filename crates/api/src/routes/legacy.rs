use axum::routing::{get, post};
use axum::Router;

use crate::handlers::legacy;
use crate::state::AppState;

/// Root-level compatibility routes.
///
/// ```text
/// GET  /status/{id}                  -> status
/// GET  /download/{id}/{filename}     -> download
/// POST /cleanup                      -> cleanup
/// GET  /models                       -> models
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status/{id}", get(legacy::status))
        .route("/download/{id}/{filename}", get(legacy::download))
        .route("/cleanup", post(legacy::cleanup))
        .route("/models", get(legacy::models))
}

/// `POST /process -> process`, under the upload timeout.
pub fn upload_router() -> Router<AppState> {
    Router::new().route("/process", post(legacy::process))
}
