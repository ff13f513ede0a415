use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use vorder_core::settings::SettingsPatch;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/config/generation
pub async fn get_settings(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let settings = state.engine.settings().await?;
    Ok(Json(DataResponse { data: settings }))
}

/// PUT /api/v1/config/generation
///
/// Only the fields present in the body change.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> AppResult<impl IntoResponse> {
    let settings = state.engine.update_settings(&patch).await?;
    Ok(Json(DataResponse { data: settings }))
}
