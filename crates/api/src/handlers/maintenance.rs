use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/maintenance/check-expired
pub async fn check_expired(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let report = state.engine.expire_sweep().await?;
    tracing::info!(
        students = report.students,
        returned = %report.returned_amount,
        "Manual expiry sweep"
    );
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/maintenance/auto-confirm
pub async fn auto_confirm(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let report = state.engine.auto_confirm_sweep().await?;
    Ok(Json(DataResponse { data: report }))
}
