use axum::routing::get;
use axum::Router;

use crate::handlers::services;
use crate::state::AppState;

/// Virtual-service identity routes mounted at `/virtual-services`.
///
/// ```text
/// GET    /            -> list_services
/// POST   /            -> create_service
/// GET    /stats       -> allocation_statistics
/// GET    /estimate    -> estimate_distribution
/// GET    /{id}        -> get_service
/// PUT    /{id}        -> update_service
/// DELETE /{id}        -> delete_service
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(services::list_services).post(services::create_service),
        )
        .route("/stats", get(services::allocation_statistics))
        .route("/estimate", get(services::estimate_distribution))
        .route(
            "/{id}",
            get(services::get_service)
                .put(services::update_service)
                .delete(services::delete_service),
        )
}
