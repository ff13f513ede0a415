use axum::routing::post;
use axum::Router;

use crate::handlers::maintenance;
use crate::state::AppState;

/// Manual triggers for the scheduled sweeps, mounted at `/maintenance`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/check-expired", post(maintenance::check_expired))
        .route("/auto-confirm", post(maintenance::auto_confirm))
}
