//! Handlers for virtual customer-service identities.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;
use vorder_core::allocation::{NewVirtualService, ServiceStatus, UpdateVirtualService};
use vorder_core::types::DbId;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateServiceRequest {
    #[validate(range(min = 1))]
    pub user_id: DbId,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub account: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateServiceRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub status: Option<ServiceStatus>,
}

#[derive(Debug, Deserialize)]
pub struct EstimateParams {
    pub amount: Decimal,
}

/// GET /api/v1/virtual-services
pub async fn list_services(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let services = state.engine.list_services().await?;
    Ok(Json(DataResponse { data: services }))
}

/// POST /api/v1/virtual-services
pub async fn create_service(
    State(state): State<AppState>,
    Json(input): Json<CreateServiceRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let new = NewVirtualService {
        user_id: input.user_id,
        name: input.name.trim().to_string(),
        account: input.account.trim().to_string(),
    };
    let service = state.engine.create_service(&new).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: service })))
}

/// GET /api/v1/virtual-services/{id}
pub async fn get_service(
    State(state): State<AppState>,
    Path(service_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let service = state.engine.get_service(service_id).await?;
    Ok(Json(DataResponse { data: service }))
}

/// PUT /api/v1/virtual-services/{id}
pub async fn update_service(
    State(state): State<AppState>,
    Path(service_id): Path<DbId>,
    Json(input): Json<UpdateServiceRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let update = UpdateVirtualService {
        name: input.name.map(|n| n.trim().to_string()),
        status: input.status,
    };
    let service = state.engine.update_service(service_id, &update).await?;
    Ok(Json(DataResponse { data: service }))
}

/// DELETE /api/v1/virtual-services/{id}
///
/// Soft delete; the identity's unaccepted tasks move to the remaining ones.
pub async fn delete_service(
    State(state): State<AppState>,
    Path(service_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let deletion = state.engine.delete_service(service_id).await?;
    Ok(Json(DataResponse { data: deletion }))
}

/// GET /api/v1/virtual-services/stats
pub async fn allocation_statistics(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = state.engine.allocation_statistics().await?;
    Ok(Json(DataResponse { data: stats }))
}

/// GET /api/v1/virtual-services/estimate?amount=
pub async fn estimate_distribution(
    State(state): State<AppState>,
    Query(params): Query<EstimateParams>,
) -> AppResult<impl IntoResponse> {
    let shares = state.engine.estimate_distribution(params.amount).await?;
    Ok(Json(DataResponse { data: shares }))
}
