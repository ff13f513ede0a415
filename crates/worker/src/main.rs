//! Background worker: runs the periodic sweeps and the daily bonus job
//! against the database until SIGINT or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vorder_core::clock::SystemClock;
use vorder_db::PgStore;
use vorder_engine::scheduler::Scheduler;
use vorder_engine::{EngineConfig, SchedulerConfig, VirtualOrderEngine};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    // LOG_FORMAT=json switches to one JSON object per line.
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vorder_worker=debug,vorder_engine=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let engine_config = EngineConfig::from_env();
    let scheduler_config = SchedulerConfig::from_env();
    tracing::info!(
        business_today = %engine_config.calendar.date_of(chrono::Utc::now()),
        daily_window_start = scheduler_config.daily_window.start_hour,
        daily_window_end = scheduler_config.daily_window.end_hour,
        "Loaded worker configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = vorder_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    vorder_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    // --- Engine and scheduler ---
    let store = Arc::new(PgStore::new(pool));
    let engine = Arc::new(VirtualOrderEngine::new(
        store.clone(),
        store,
        Arc::new(SystemClock),
        engine_config,
    ));
    let scheduler = Scheduler::new(engine, scheduler_config);

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move {
        scheduler.run(cancel_clone).await;
    });

    shutdown_signal().await;
    cancel.cancel();

    // A sweep in flight finishes before the loop observes the cancellation.
    match tokio::time::timeout(Duration::from_secs(30), handle).await {
        Ok(Ok(())) => tracing::info!("Scheduler stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task failed"),
        Err(_) => tracing::warn!("Scheduler did not stop within 30s"),
    }
    tracing::info!("Worker shut down");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
