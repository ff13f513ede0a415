mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use vorder_core::money::money;
use vorder_core::settings::RuntimeSettings;
use vorder_engine::scheduler::Scheduler;
use vorder_engine::SchedulerConfig;

use common::{day, harness, row, Harness};

async fn funded() -> Harness {
    let h = harness().await;
    h.store
        .set_settings(RuntimeSettings {
            daily_target: money(1),
            ..RuntimeSettings::default()
        })
        .await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    h.engine.import_subsidy(&row(2, 100), None).await.unwrap();
    h.work_first_task(1).await;
    h
}

#[tokio::test]
async fn daily_job_runs_once_inside_the_window() {
    let h = funded().await;
    h.clock.set(Utc.with_ymd_and_hms(2026, 3, 3, 0, 30, 0).unwrap());
    let scheduler = Scheduler::new(h.engine.clone(), SchedulerConfig::default());

    let report = scheduler.run_daily_tick().await.expect("daily job should run");

    assert_eq!(report.process_date, day(2));
    assert_eq!(report.pool_date, day(3));
    assert_eq!(report.achievements.achieved_students, 1);
    assert!(report.pool.is_some());
    assert!(report.generation.unwrap().created_tasks > 0);
    assert_eq!(scheduler.last_daily_run(), Some(day(3)));

    assert!(scheduler.run_daily_tick().await.is_none());
}

#[tokio::test]
async fn daily_job_waits_for_the_window() {
    let h = funded().await;
    h.clock.set(Utc.with_ymd_and_hms(2026, 3, 3, 3, 0, 0).unwrap());
    let scheduler = Scheduler::new(h.engine.clone(), SchedulerConfig::default());

    assert!(scheduler.run_daily_tick().await.is_none());
    assert!(h.store.bonus_pool(day(3)).await.is_none());
}

#[tokio::test]
async fn restart_does_not_repeat_the_daily_job() {
    let h = funded().await;
    h.clock.set(Utc.with_ymd_and_hms(2026, 3, 3, 0, 30, 0).unwrap());
    Scheduler::new(h.engine.clone(), SchedulerConfig::default())
        .run_daily_tick()
        .await
        .expect("first run");

    let restarted = Scheduler::new(h.engine.clone(), SchedulerConfig::default());
    restarted.restore_last_run().await;

    assert_eq!(restarted.last_daily_run(), Some(day(3)));
    assert!(restarted.run_daily_tick().await.is_none());
}

#[tokio::test]
async fn expiry_tick_sweeps_and_confirms() {
    let h = funded().await;
    let task = h.student_tasks(2).await[0].clone();
    h.engine.accept_task(task.id, 2).await.unwrap();
    h.engine.submit_task(task.id, 2).await.unwrap();
    h.clock.advance(chrono::Duration::hours(4));
    let scheduler = Scheduler::new(h.engine.clone(), SchedulerConfig::default());

    let (expiry, confirm) = scheduler.run_expiry_tick().await;

    assert_eq!(expiry.unwrap().students, 2);
    assert_eq!(confirm.unwrap().confirmed, 1);
    assert_eq!(h.settlement_gap(1).await, rust_decimal::Decimal::ZERO);
    assert_eq!(h.settlement_gap(2).await, rust_decimal::Decimal::ZERO);
}

#[tokio::test]
async fn run_stops_on_cancel() {
    let h = harness().await;
    let scheduler = Arc::new(Scheduler::new(h.engine.clone(), SchedulerConfig::default()));
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });
    cancel.cancel();

    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("scheduler should stop")
        .unwrap();
}
