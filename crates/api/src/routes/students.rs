use axum::routing::get;
use axum::Router;

use crate::handlers::students;
use crate::state::AppState;

/// Student-facing routes mounted at `/students`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{student_id}/tasks", get(students::visible_tasks))
        .route("/{student_id}/achievement", get(students::achievement))
}
