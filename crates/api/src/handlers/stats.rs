use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/stats
pub async fn overview(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let overview = state.engine.overview().await?;
    Ok(Json(DataResponse { data: overview }))
}
