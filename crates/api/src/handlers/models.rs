use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Installed models per backend family, listed on the blocking pool.
pub(crate) async fn installed_models(
    state: &AppState,
) -> AppResult<BTreeMap<&'static str, Vec<String>>> {
    let inventory = state.inventory.clone();
    tokio::task::spawn_blocking(move || inventory.list())
        .await
        .map_err(|e| AppError::InternalError(format!("Model listing failed: {e}")))
}

/// GET /api/v1/models
pub async fn list_models(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let models = installed_models(&state).await?;
    Ok(Json(DataResponse { data: models }))
}
