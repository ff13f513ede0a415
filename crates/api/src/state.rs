use std::sync::Arc;

use vorder_engine::VirtualOrderEngine;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; inner data is behind `Arc` or already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, used directly only by the health check.
    pub pool: vorder_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Every domain operation goes through the engine.
    pub engine: Arc<VirtualOrderEngine>,
}
