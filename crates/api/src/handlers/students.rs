use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use vorder_core::types::DbId;

use crate::error::AppResult;
use crate::query::DateParams;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/students/{student_id}/tasks
pub async fn visible_tasks(
    State(state): State<AppState>,
    Path(student_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let view = state.engine.visible_tasks(student_id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// GET /api/v1/students/{student_id}/achievement?date=
///
/// Defaults to yesterday, the day that decides today's bonus access.
pub async fn achievement(
    State(state): State<AppState>,
    Path(student_id): Path<DbId>,
    Query(params): Query<DateParams>,
) -> AppResult<impl IntoResponse> {
    let today = state.engine.today();
    let date = params
        .date
        .unwrap_or_else(|| today.pred_opt().unwrap_or(today));
    let record = state.engine.student_achievement(student_id, date).await?;
    Ok(Json(DataResponse { data: record }))
}
