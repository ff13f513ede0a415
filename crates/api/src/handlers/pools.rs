//! Handlers for subsidy pools: batch import, inspection and the manual
//! reset, delete and reallocation actions.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;
use vorder_core::ledger::PoolStatus;
use vorder_core::types::DbId;
use vorder_engine::ledger::{GenerationMode, SubsidyImportRow};

use crate::error::AppResult;
use crate::query::{clamp_limit, clamp_offset};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ImportRowInput {
    #[validate(range(min = 1))]
    pub student_id: DbId,
    #[validate(length(min = 1, max = 100))]
    pub student_name: String,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImportRequest {
    #[validate(length(min = 1, max = 64))]
    pub batch: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    #[validate(nested)]
    pub rows: Vec<ImportRowInput>,
}

#[derive(Debug, Deserialize)]
pub struct PoolListParams {
    pub status: Option<PoolStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReallocateRequest {
    #[serde(default)]
    pub mode: GenerationMode,
}

/// GET /api/v1/pools
pub async fn list_pools(
    State(state): State<AppState>,
    Query(params): Query<PoolListParams>,
) -> AppResult<impl IntoResponse> {
    let pools = state
        .engine
        .list_pools(
            params.status,
            clamp_limit(params.limit),
            clamp_offset(params.offset),
        )
        .await?;
    Ok(Json(DataResponse { data: pools }))
}

/// POST /api/v1/pools/import
///
/// Rows are processed one by one; failures are reported per row and never
/// abort the batch.
pub async fn import_subsidies(
    State(state): State<AppState>,
    Json(input): Json<ImportRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let rows: Vec<SubsidyImportRow> = input
        .rows
        .into_iter()
        .map(|row| SubsidyImportRow {
            student_id: row.student_id,
            student_name: row.student_name.trim().to_string(),
            amount: row.amount,
        })
        .collect();
    let report = state
        .engine
        .import_batch(&rows, input.batch.as_deref())
        .await;

    Ok(Json(DataResponse { data: report }))
}

/// GET /api/v1/pools/{student_id}
pub async fn get_pool(
    State(state): State<AppState>,
    Path(student_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let view = state.engine.get_pool(student_id).await?;
    Ok(Json(DataResponse { data: view }))
}

/// DELETE /api/v1/pools/{student_id}
pub async fn delete_pool(
    State(state): State<AppState>,
    Path(student_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let change = state.engine.delete_pool(student_id).await?;
    tracing::info!(
        student_id,
        cancelled_tasks = change.cancelled_tasks,
        "Subsidy pool deleted"
    );
    Ok(Json(DataResponse { data: change }))
}

/// POST /api/v1/pools/{student_id}/reset
pub async fn reset_pool(
    State(state): State<AppState>,
    Path(student_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let change = state.engine.reset_pool(student_id).await?;
    Ok(Json(DataResponse { data: change }))
}

/// POST /api/v1/pools/{student_id}/reallocate
///
/// The body is optional; without one the whole remaining balance is split.
pub async fn reallocate_pool(
    State(state): State<AppState>,
    Path(student_id): Path<DbId>,
    input: Option<Json<ReallocateRequest>>,
) -> AppResult<impl IntoResponse> {
    let mode = input.map(|Json(r)| r.mode).unwrap_or_default();
    let change = state.engine.reallocate(student_id, mode).await?;
    Ok(Json(DataResponse { data: change }))
}
