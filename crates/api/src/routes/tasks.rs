use axum::routing::{get, post};
use axum::Router;

use crate::handlers::tasks;
use crate::state::AppState;

/// Virtual task routes mounted at `/tasks`.
///
/// ```text
/// GET  /{id}            -> get_task
/// POST /{id}/accept     -> accept_task
/// POST /{id}/start      -> start_task
/// POST /{id}/submit     -> submit_task
/// POST /{id}/complete   -> complete_task
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(tasks::get_task))
        .route("/{id}/accept", post(tasks::accept_task))
        .route("/{id}/start", post(tasks::start_task))
        .route("/{id}/submit", post(tasks::submit_task))
        .route("/{id}/complete", post(tasks::complete_task))
}
