pub mod bonus;
pub mod health;
pub mod maintenance;
pub mod pools;
pub mod services;
pub mod settings;
pub mod students;
pub mod tasks;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /stats                                   system overview (GET)
///
/// /pools                                   list (GET)
/// /pools/import                            batch subsidy import (POST)
/// /pools/{student_id}                      get, soft delete
/// /pools/{student_id}/reset                reset and regenerate (POST)
/// /pools/{student_id}/reallocate           generate from remaining (POST)
///
/// /tasks/{id}                              get
/// /tasks/{id}/accept                       student accepts (POST)
/// /tasks/{id}/start                        student starts (POST)
/// /tasks/{id}/submit                       student submits (POST)
/// /tasks/{id}/complete                     settle completion (POST)
///
/// /students/{student_id}/tasks             personal and bonus tasks (GET)
/// /students/{student_id}/achievement       daily achievement (GET)
///
/// /virtual-services                        list, create
/// /virtual-services/stats                  per-identity allocation stats (GET)
/// /virtual-services/estimate               weighted distribution preview (GET)
/// /virtual-services/{id}                   get, update, soft delete
///
/// /bonus-pool/status                       pool and task counts (GET)
/// /bonus-pool/daily-run                    achievements + pool + tasks (POST)
/// /bonus-pool/generate                     generate bonus tasks (POST)
/// /bonus-pool/process-expired              bonus expiry sweep (POST)
///
/// /maintenance/check-expired               expiry sweep (POST)
/// /maintenance/auto-confirm                auto-confirm sweep (POST)
///
/// /config/generation                       runtime switches (GET, PUT)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(handlers::stats::overview))
        .nest("/pools", pools::router())
        .nest("/tasks", tasks::router())
        .nest("/students", students::router())
        .nest("/virtual-services", services::router())
        .nest("/bonus-pool", bonus::router())
        .nest("/maintenance", maintenance::router())
        .nest("/config", settings::router())
}
