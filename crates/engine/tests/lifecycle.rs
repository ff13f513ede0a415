mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use rust_decimal::Decimal;
use vorder_core::error::CoreError;
use vorder_core::money::money;
use vorder_core::task::TaskStatus;
use vorder_engine::ledger::GenerationMode;
use vorder_engine::EngineError;

use common::{harness, row};

#[tokio::test]
async fn completion_pays_the_agent_rate_and_recycles_the_rest() {
    let h = harness().await;
    h.store.set_rebate(1, "50%").await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();
    h.engine.accept_task(task.id, 1).await.unwrap();
    h.engine.submit_task(task.id, 1).await.unwrap();

    let report = h.engine.complete_task(task.id).await.unwrap();

    assert_eq!(report.payout.student_income, task.commission / Decimal::TWO);
    assert_eq!(report.payout.remaining_value, task.commission - report.payout.student_income);
    assert_eq!(report.task.status, TaskStatus::Completed);
    assert!(report.task.value_recycled);
    assert!(!report.cross_day);

    let pool = h.store.pool(1).await.unwrap();
    assert_eq!(pool.consumed_subsidy, report.payout.student_income);
    assert_eq!(pool.completed_amount, task.commission);
    assert!(pool.is_balanced());
    assert_eq!(h.settlement_gap(1).await, Decimal::ZERO);
}

#[tokio::test]
async fn unresolvable_rebate_falls_back_to_sixty_percent() {
    let h = harness().await;
    h.store.set_rebate(1, "not a rate").await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.work_first_task(1).await;

    let pool = h.store.pool(1).await.unwrap();
    assert_eq!(pool.consumed_subsidy, task.commission * Decimal::new(6, 1));
}

#[tokio::test]
async fn cross_day_completion_does_not_regenerate() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();
    h.engine.accept_task(task.id, 1).await.unwrap();
    h.engine.submit_task(task.id, 1).await.unwrap();
    let remaining_before = h.store.pool(1).await.unwrap().remaining_amount;
    let tasks_before = h.store.tasks().await.len();

    h.clock.advance(Duration::days(1));
    let report = h.engine.complete_task(task.id).await.unwrap();

    assert!(report.cross_day);
    assert!(report.regeneration.is_none());
    assert_eq!(h.store.tasks().await.len(), tasks_before);
    assert_eq!(
        h.store.pool(1).await.unwrap().remaining_amount,
        remaining_before + report.payout.remaining_value
    );
}

#[tokio::test]
async fn completed_task_cannot_be_completed_again() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.work_first_task(1).await;

    assert_matches!(
        h.engine.complete_task(task.id).await,
        Err(EngineError::Core(CoreError::InvalidState(_)))
    );
}

#[tokio::test]
async fn expiry_returns_face_value_and_regenerates() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let original = h.student_tasks(1).await;
    let original_value: Decimal = original.iter().map(|t| t.commission).sum();

    h.clock.advance(Duration::hours(4));
    let report = h.engine.expire_sweep().await.unwrap();

    assert_eq!(report.students, 1);
    assert_eq!(report.deleted_tasks, original.len());
    assert_eq!(report.returned_amount, original_value);
    assert!(report.regenerated_tasks > 0);
    for task in &original {
        assert!(h.store.task(task.id).await.is_none());
    }
    let pool = h.store.pool(1).await.unwrap();
    assert_eq!(pool.consumed_subsidy, Decimal::ZERO);
    assert_eq!(h.settlement_gap(1).await, Decimal::ZERO);
    assert_eq!(h.store.available_images().await, 500 - h.store.tasks().await.len());
}

#[tokio::test]
async fn terminated_task_value_is_recycled_once() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();
    h.store
        .update_task(task.id, |t| t.status = TaskStatus::Terminated)
        .await;
    let remaining_before = h.store.pool(1).await.unwrap().remaining_amount;

    let report = h.engine.expire_sweep().await.unwrap();
    assert_eq!(report.recycled_tasks, 1);
    assert_eq!(report.returned_amount, task.commission);
    assert!(h.store.task(task.id).await.unwrap().value_recycled);

    let second = h.engine.expire_sweep().await.unwrap();
    assert_eq!(second.students, 0);
    assert!(h.store.pool(1).await.unwrap().remaining_amount <= remaining_before + task.commission);
}

#[tokio::test]
async fn auto_confirm_completes_stale_submissions() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();
    h.engine.accept_task(task.id, 1).await.unwrap();
    h.engine.submit_task(task.id, 1).await.unwrap();

    let early = h.engine.auto_confirm_sweep().await.unwrap();
    assert_eq!(early.confirmed, 0);

    h.clock.advance(Duration::hours(2));
    let report = h.engine.auto_confirm_sweep().await.unwrap();
    assert_eq!(report.confirmed, 1);
    assert_eq!(h.store.task(task.id).await.unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn concurrent_accepts_have_one_winner() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();

    let (a, b) = tokio::join!(h.engine.accept_task(task.id, 1), h.engine.accept_task(task.id, 1));

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let loser = if a.is_ok() { b } else { a };
    assert_matches!(loser, Err(EngineError::Core(CoreError::Conflict(_))));
}

#[tokio::test]
async fn concurrent_completions_in_one_pool_are_both_booked() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    h.engine.reallocate(1, GenerationMode::Full).await.unwrap();
    let tasks = h.student_tasks(1).await;
    assert!(tasks.len() >= 2, "{tasks:?}");
    let (a, b) = (tasks[0].clone(), tasks[1].clone());
    for task in [&a, &b] {
        h.engine.accept_task(task.id, 1).await.unwrap();
        h.engine.submit_task(task.id, 1).await.unwrap();
    }

    let (first, second) = tokio::join!(h.engine.complete_task(a.id), h.engine.complete_task(b.id));
    let (first, second) = (first.unwrap(), second.unwrap());

    let pool = h.store.pool(1).await.unwrap();
    assert_eq!(pool.completed_amount, a.commission + b.commission);
    assert_eq!(
        pool.consumed_subsidy,
        first.payout.student_income + second.payout.student_income
    );
    assert!(pool.is_balanced());
    assert_eq!(h.settlement_gap(1).await, Decimal::ZERO);
}

#[tokio::test]
async fn duplicate_completion_is_booked_once() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();
    h.engine.accept_task(task.id, 1).await.unwrap();
    h.engine.submit_task(task.id, 1).await.unwrap();

    let (a, b) = tokio::join!(h.engine.complete_task(task.id), h.engine.complete_task(task.id));

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let loser = if a.is_ok() { b } else { a };
    assert_matches!(loser, Err(EngineError::Core(CoreError::InvalidState(_))));
    let pool = h.store.pool(1).await.unwrap();
    assert_eq!(pool.completed_amount, task.commission);
    assert_eq!(h.settlement_gap(1).await, Decimal::ZERO);
}

#[tokio::test]
async fn completion_racing_expiry_is_booked_once() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    h.engine.reallocate(1, GenerationMode::Full).await.unwrap();
    let tasks = h.student_tasks(1).await;
    let held = tasks[0].clone();
    let expiring: Decimal = tasks[1..].iter().map(|t| t.commission).sum();
    h.engine.accept_task(held.id, 1).await.unwrap();
    h.engine.submit_task(held.id, 1).await.unwrap();
    h.clock.advance(Duration::hours(4));

    let (completion, sweep) =
        tokio::join!(h.engine.complete_task(held.id), h.engine.expire_sweep());
    let (completion, sweep) = (completion.unwrap(), sweep.unwrap());

    assert_eq!(sweep.deleted_tasks, tasks.len() - 1);
    assert_eq!(sweep.returned_amount, expiring);
    let settled = h.store.task(held.id).await.expect("held task survives the sweep");
    assert_eq!(settled.status, TaskStatus::Completed);
    let pool = h.store.pool(1).await.unwrap();
    assert_eq!(pool.completed_amount, held.commission);
    assert_eq!(pool.consumed_subsidy, completion.payout.student_income);
    assert!(pool.is_balanced());
    assert_eq!(h.settlement_gap(1).await, Decimal::ZERO);
}

#[tokio::test]
async fn terminated_task_cannot_be_completed_while_recycled() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();
    h.store
        .update_task(task.id, |t| t.status = TaskStatus::Terminated)
        .await;

    let (completion, sweep) =
        tokio::join!(h.engine.complete_task(task.id), h.engine.expire_sweep());

    assert_matches!(completion, Err(EngineError::Core(CoreError::InvalidState(_))));
    let sweep = sweep.unwrap();
    assert_eq!(sweep.recycled_tasks, 1);
    assert_eq!(sweep.returned_amount, task.commission);
    let pool = h.store.pool(1).await.unwrap();
    assert_eq!(pool.completed_amount, Decimal::ZERO);
    assert_eq!(pool.consumed_subsidy, Decimal::ZERO);
}

#[tokio::test]
async fn students_cannot_take_each_others_tasks() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();

    assert_matches!(
        h.engine.accept_task(task.id, 2).await,
        Err(EngineError::Core(CoreError::Forbidden(_)))
    );
    h.engine.accept_task(task.id, 1).await.unwrap();
    assert_matches!(
        h.engine.start_task(task.id, 2).await,
        Err(EngineError::Core(CoreError::Forbidden(_)))
    );
}

#[tokio::test]
async fn expired_task_cannot_be_accepted() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();

    h.clock.advance(Duration::hours(4));
    assert_matches!(
        h.engine.accept_task(task.id, 1).await,
        Err(EngineError::Core(CoreError::InvalidState(_)))
    );
}

#[tokio::test]
async fn start_then_submit_follows_the_state_machine() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();
    let task = h.student_tasks(1).await[0].clone();
    h.engine.accept_task(task.id, 1).await.unwrap();

    let started = h.engine.start_task(task.id, 1).await.unwrap();
    assert_eq!(started.status, TaskStatus::InProgress);
    assert_matches!(
        h.engine.start_task(task.id, 1).await,
        Err(EngineError::Core(CoreError::InvalidState(_)))
    );
    let submitted = h.engine.submit_task(task.id, 1).await.unwrap();
    assert_eq!(submitted.status, TaskStatus::Submitted);
    assert!(submitted.submitted_at.is_some());
}

#[tokio::test]
async fn visible_tasks_hide_bonus_without_access() {
    let h = harness().await;
    h.engine.import_subsidy(&row(1, 100), None).await.unwrap();

    let view = h.engine.visible_tasks(1).await.unwrap();
    assert!(!view.bonus_access);
    assert!(view.bonus.is_empty());
    assert_eq!(view.personal.len(), h.student_tasks(1).await.len());
    assert!(view.personal.iter().all(|t| t.commission >= money(1)));
}
