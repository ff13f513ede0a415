use axum::routing::{get, post};
use axum::Router;

use crate::handlers::bonus;
use crate::state::AppState;

/// Bonus pool routes mounted at `/bonus-pool`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(bonus::status))
        .route("/daily-run", post(bonus::daily_run))
        .route("/generate", post(bonus::generate))
        .route("/process-expired", post(bonus::process_expired))
}
