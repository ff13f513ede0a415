//! Handlers for the virtual task lifecycle.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use validator::Validate;
use vorder_core::types::DbId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of the student actions: who is acting.
#[derive(Debug, Deserialize, Validate)]
pub struct StudentAction {
    #[validate(range(min = 1))]
    pub student_id: DbId,
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let task = state.engine.get_task(task_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/tasks/{id}/accept
///
/// Exactly one of several concurrent accepts wins; the rest get 409.
pub async fn accept_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
    Json(input): Json<StudentAction>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let task = state.engine.accept_task(task_id, input.student_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/tasks/{id}/start
pub async fn start_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
    Json(input): Json<StudentAction>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let task = state.engine.start_task(task_id, input.student_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/tasks/{id}/submit
pub async fn submit_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
    Json(input): Json<StudentAction>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let task = state.engine.submit_task(task_id, input.student_id).await?;
    Ok(Json(DataResponse { data: task }))
}

/// POST /api/v1/tasks/{id}/complete
///
/// Settles the task. A failed follow-up regeneration is reported in
/// `warning` and does not fail the request.
pub async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let report = state.engine.complete_task(task_id).await?;
    Ok(Json(DataResponse { data: report }))
}
