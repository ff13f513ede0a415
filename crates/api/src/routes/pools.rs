use axum::routing::{get, post};
use axum::Router;

use crate::handlers::pools;
use crate::state::AppState;

/// Subsidy pool routes mounted at `/pools`.
///
/// ```text
/// GET    /                          -> list_pools
/// POST   /import                    -> import_subsidies
/// GET    /{student_id}              -> get_pool
/// DELETE /{student_id}              -> delete_pool
/// POST   /{student_id}/reset        -> reset_pool
/// POST   /{student_id}/reallocate   -> reallocate_pool
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(pools::list_pools))
        .route("/import", post(pools::import_subsidies))
        .route(
            "/{student_id}",
            get(pools::get_pool).delete(pools::delete_pool),
        )
        .route("/{student_id}/reset", post(pools::reset_pool))
        .route("/{student_id}/reallocate", post(pools::reallocate_pool))
}
