use axum::routing::get;
use axum::Router;

use crate::handlers::settings;
use crate::state::AppState;

/// Runtime switch routes mounted at `/config`.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/generation",
        get(settings::get_settings).put(settings::update_settings),
    )
}
