mod common;

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use vorder_core::error::CoreError;
use vorder_core::money::money;
use vorder_core::settings::RuntimeSettings;
use vorder_core::task::TaskStatus;
use vorder_engine::EngineError;

use common::{day, harness, row, Harness};

/// Two students funded on March 2nd; only student 1 earns anything that day.
async fn one_achiever() -> Harness {
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

fn next_morning() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 3, 0, 30, 0).unwrap()
}

#[tokio::test]
async fn achievements_follow_daily_income() {
    let h = one_achiever().await;

    let summary = h.engine.update_daily_achievements(day(2)).await.unwrap();

    assert_eq!(summary.total_students, 2);
    assert_eq!(summary.achieved_students, 1);
    assert_eq!(summary.achievement_rate, money(50));
    let achievement = h.engine.student_achievement(1, day(2)).await.unwrap();
    assert!(achievement.is_achieved);
    assert!(achievement.completed_amount > Decimal::ZERO);
}

#[tokio::test]
async fn pool_collects_non_achievers_and_stale_tasks() {
    let h = one_achiever().await;
    h.engine.update_daily_achievements(day(2)).await.unwrap();
    let achiever_remaining = h.store.pool(1).await.unwrap().remaining_amount;

    h.clock.set(next_morning());
    let update = h.engine.create_or_update_pool(day(3)).await.unwrap();

    assert_eq!(update.forfeited_students, 1);
    assert!(update.forfeited_amount > Decimal::ZERO);
    assert!(update.stale_tasks > 0);
    assert_eq!(update.carried_forward, Decimal::ZERO);
    assert_eq!(update.pool.total_amount, update.forfeited_amount + update.stale_amount);
    assert_eq!(update.pool.remaining_amount, update.pool.total_amount);

    assert_eq!(h.store.pool(2).await.unwrap().remaining_amount, Decimal::ZERO);
    assert_eq!(h.store.pool(1).await.unwrap().remaining_amount, achiever_remaining);
    assert_eq!(h.settlement_gap(1).await, Decimal::ZERO);
    assert_eq!(h.settlement_gap(2).await, Decimal::ZERO);
}

#[tokio::test]
async fn pool_update_is_repeatable() {
    let h = one_achiever().await;
    h.engine.update_daily_achievements(day(2)).await.unwrap();
    h.clock.set(next_morning());

    let first = h.engine.create_or_update_pool(day(3)).await.unwrap();
    let second = h.engine.create_or_update_pool(day(3)).await.unwrap();

    assert_eq!(second.forfeited_amount, Decimal::ZERO);
    assert_eq!(second.stale_tasks, 0);
    assert_eq!(second.pool.total_amount, first.pool.total_amount);
}

#[tokio::test]
async fn only_achievers_see_and_take_bonus_tasks() {
    let h = one_achiever().await;
    h.engine.update_daily_achievements(day(2)).await.unwrap();
    h.clock.set(next_morning());
    h.engine.create_or_update_pool(day(3)).await.unwrap();

    let generation = h.engine.generate_tasks(day(3), 5).await.unwrap();
    assert!(generation.skipped.is_none());
    assert!((1..=5).contains(&generation.created_tasks));
    let bonus = h.bonus_tasks(day(3)).await;
    assert_eq!(bonus.len(), generation.created_tasks);
    assert!(bonus.iter().all(|t| t.target_student_id.is_none()));
    assert_eq!(
        h.store.bonus_pool(day(3)).await.unwrap().generated_amount,
        generation.generated_amount
    );

    assert!(h.engine.check_access(1, day(3)).await.unwrap());
    assert!(!h.engine.check_access(2, day(3)).await.unwrap());
    assert_eq!(h.engine.visible_tasks(1).await.unwrap().bonus.len(), bonus.len());
    assert!(h.engine.visible_tasks(2).await.unwrap().bonus.is_empty());

    assert_matches!(
        h.engine.accept_task(bonus[0].id, 2).await,
        Err(EngineError::Core(CoreError::Forbidden(_)))
    );
    let taken = h.engine.accept_task(bonus[0].id, 1).await.unwrap();
    assert_eq!(taken.status, TaskStatus::Accepted);
}

#[tokio::test]
async fn bonus_completion_debits_real_payout_only() {
    let h = one_achiever().await;
    h.engine.update_daily_achievements(day(2)).await.unwrap();
    h.clock.set(next_morning());
    h.engine.create_or_update_pool(day(3)).await.unwrap();
    h.engine.generate_tasks(day(3), 3).await.unwrap();
    let before = h.store.bonus_pool(day(3)).await.unwrap();
    let task = h.bonus_tasks(day(3)).await[0].clone();

    h.engine.accept_task(task.id, 1).await.unwrap();
    h.engine.submit_task(task.id, 1).await.unwrap();
    let report = h.engine.complete_task(task.id).await.unwrap();

    let income = task.commission * Decimal::new(6, 1);
    assert_eq!(report.payout.student_income, income);
    let after = h.store.bonus_pool(day(3)).await.unwrap();
    assert_eq!(after.remaining_amount, before.remaining_amount - income);
    assert_eq!(after.completed_amount, task.commission);

    let student = h.store.pool(1).await.unwrap();
    assert_eq!(student.bonus_pool_completed_amount, task.commission);
    assert_eq!(student.bonus_pool_consumed_subsidy, income);

    // Open bonus face value always matches what the pool holds back.
    let open: Decimal = h
        .bonus_tasks(day(3))
        .await
        .iter()
        .filter(|t| !t.status.is_terminal())
        .map(|t| t.commission)
        .sum();
    assert_eq!(after.generated_amount, open);
}

#[tokio::test]
async fn bonus_income_does_not_count_toward_achievement() {
    let h = one_achiever().await;
    h.engine.update_daily_achievements(day(2)).await.unwrap();
    h.clock.set(next_morning());
    h.engine.create_or_update_pool(day(3)).await.unwrap();
    h.engine.generate_tasks(day(3), 3).await.unwrap();
    let task = h.bonus_tasks(day(3)).await[0].clone();
    h.engine.accept_task(task.id, 1).await.unwrap();
    h.engine.submit_task(task.id, 1).await.unwrap();
    let report = h.engine.complete_task(task.id).await.unwrap();
    assert!(report.payout.student_income > Decimal::ZERO);

    h.engine.update_daily_achievements(day(3)).await.unwrap();

    let achievement = h.engine.student_achievement(1, day(3)).await.unwrap();
    assert_eq!(achievement.completed_amount, Decimal::ZERO);
    assert!(!achievement.is_achieved);
}

#[tokio::test]
async fn generation_skips_without_qualified_students() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    h.clock.set(next_morning());
    h.engine.create_or_update_pool(day(3)).await.unwrap();

    let report = h.engine.generate_tasks(day(3), 5).await.unwrap();

    assert_eq!(report.created_tasks, 0);
    assert!(report.skipped.is_some());
    assert!(h.bonus_tasks(day(3)).await.is_empty());
}

#[tokio::test]
async fn generation_for_past_date_is_rejected() {
    let h = harness().await;
    assert_matches!(
        h.engine.generate_tasks(day(1), 1).await,
        Err(EngineError::Core(CoreError::Validation(_)))
    );
}

#[tokio::test]
async fn expired_bonus_tasks_are_dropped_and_replaced() {
    let h = one_achiever().await;
    h.engine.update_daily_achievements(day(2)).await.unwrap();
    h.clock.set(next_morning());
    h.engine.create_or_update_pool(day(3)).await.unwrap();
    h.engine.generate_tasks(day(3), 4).await.unwrap();
    let original = h.bonus_tasks(day(3)).await;

    h.clock.advance(Duration::hours(4));
    let report = h.engine.expire_bonus_sweep().await.unwrap();

    assert_eq!(report.dates, 1);
    assert_eq!(report.expired_tasks, original.len());
    assert_eq!(
        report.released_amount,
        original.iter().map(|t| t.commission).sum::<Decimal>()
    );
    assert!(report.regenerated_tasks > 0);
    for task in &original {
        assert!(h.store.task(task.id).await.is_none());
    }
    let pool = h.store.bonus_pool(day(3)).await.unwrap();
    let open: Decimal = h.bonus_tasks(day(3)).await.iter().map(|t| t.commission).sum();
    assert_eq!(pool.generated_amount, open);
}

#[tokio::test]
async fn next_day_carries_forward_unused_bonus() {
    let h = one_achiever().await;
    h.engine.update_daily_achievements(day(2)).await.unwrap();
    h.clock.set(next_morning());
    h.engine.create_or_update_pool(day(3)).await.unwrap();
    h.engine.generate_tasks(day(3), 2).await.unwrap();
    let open = h.bonus_tasks(day(3)).await.len();

    h.clock.set(Utc.with_ymd_and_hms(2026, 3, 4, 0, 30, 0).unwrap());
    let update = h.engine.create_or_update_pool(day(4)).await.unwrap();

    assert_eq!(update.dropped_bonus_tasks, open);
    assert!(h.bonus_tasks(day(3)).await.is_empty());
    let previous = h.store.bonus_pool(day(3)).await.unwrap();
    assert_eq!(previous.generated_amount, Decimal::ZERO);
    assert_eq!(update.carried_forward, previous.available());
    assert!(update.pool.total_amount >= update.carried_forward);
}

#[tokio::test]
async fn bonus_status_reports_counts_and_qualified_students() {
    let h = one_achiever().await;
    h.engine.update_daily_achievements(day(2)).await.unwrap();
    h.clock.set(next_morning());
    h.engine.create_or_update_pool(day(3)).await.unwrap();
    let generation = h.engine.generate_tasks(day(3), 3).await.unwrap();

    let status = h.engine.bonus_status(day(3)).await.unwrap();

    assert!(status.enabled);
    assert_eq!(status.qualified_students, 1);
    assert_eq!(status.task_counts.unaccepted, generation.created_tasks as i64);
    assert_eq!(status.available, status.pool.unwrap().available());
}
