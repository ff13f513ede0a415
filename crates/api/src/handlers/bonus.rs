//! Handlers for the bonus pool: status and the manual triggers of the
//! daily job, generation and expiry.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::query::DateParams;
use crate::response::DataResponse;
use crate::state::AppState;

const MAX_GENERATE_COUNT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct DailyRunParams {
    /// Day whose achievements are evaluated; defaults to yesterday.
    pub process_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    pub date: Option<NaiveDate>,
    pub count: Option<usize>,
}

/// GET /api/v1/bonus-pool/status?date=
pub async fn status(
    State(state): State<AppState>,
    Query(params): Query<DateParams>,
) -> AppResult<impl IntoResponse> {
    let date = params.date.unwrap_or_else(|| state.engine.today());
    let status = state.engine.bonus_status(date).await?;
    Ok(Json(DataResponse { data: status }))
}

/// POST /api/v1/bonus-pool/daily-run?process_date=
pub async fn daily_run(
    State(state): State<AppState>,
    Query(params): Query<DailyRunParams>,
) -> AppResult<impl IntoResponse> {
    let today = state.engine.today();
    let process_date = params
        .process_date
        .unwrap_or_else(|| today.pred_opt().unwrap_or(today));
    let report = state.engine.run_daily(process_date).await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/bonus-pool/generate?date=&count=
pub async fn generate(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> AppResult<impl IntoResponse> {
    let date = params.date.unwrap_or_else(|| state.engine.today());
    let count = params
        .count
        .unwrap_or(state.engine.config().bonus_initial_tasks);
    if count == 0 || count > MAX_GENERATE_COUNT {
        return Err(AppError::BadRequest(format!(
            "count must be between 1 and {MAX_GENERATE_COUNT}"
        )));
    }
    let report = state.engine.generate_tasks(date, count).await?;
    Ok(Json(DataResponse { data: report }))
}

/// POST /api/v1/bonus-pool/process-expired
pub async fn process_expired(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let report = state.engine.expire_bonus_sweep().await?;
    Ok(Json(DataResponse { data: report }))
}
