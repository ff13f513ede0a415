//! Task completion, expiry and student-side status changes.

use rust_decimal::Decimal;
use serde::Serialize;
use vorder_core::bonus::BonusPoolSnapshot;
use vorder_core::error::CoreError;
use vorder_core::ledger::{Payout, PoolSnapshot};
use vorder_core::lifecycle::{ensure_completable, ExpiryBatch};
use vorder_core::task::{state_machine, TaskChange, TaskRecord, TaskStatus};
use vorder_core::types::{DbId, Money};

use crate::bonus::BonusGenerationReport;
use crate::ledger::{RegenerationReport, RegenerationTrigger};
use crate::{audit, EngineError, EngineResult, VirtualOrderEngine};

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub task: TaskRecord,
    pub payout: Payout,
    /// Created on an earlier business day; never regenerates.
    pub cross_day: bool,
    pub pool: Option<PoolSnapshot>,
    pub bonus_pool: Option<BonusPoolSnapshot>,
    pub regeneration: Option<RegenerationReport>,
    pub bonus_generation: Option<BonusGenerationReport>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpirySweepReport {
    pub students: usize,
    pub deleted_tasks: usize,
    pub recycled_tasks: usize,
    pub returned_amount: Money,
    pub regenerated_tasks: usize,
    pub failures: Vec<SweepFailure>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoConfirmReport {
    pub confirmed: usize,
    pub failures: Vec<SweepFailure>,
    pub warnings: Vec<String>,
}

/// Tasks a student sees on their task board.
#[derive(Debug, Clone, Serialize)]
pub struct StudentTaskView {
    pub student_id: DbId,
    pub personal: Vec<TaskRecord>,
    /// Bonus tasks the student took, plus today's open ones when unlocked.
    pub bonus: Vec<TaskRecord>,
    pub bonus_access: bool,
}

/// Outcome of expiring one student's tasks, before regeneration.
struct StudentExpiry {
    deleted: usize,
    recycled: usize,
    returned: Money,
    has_pool: bool,
}

impl VirtualOrderEngine {
    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    /// Settle a task: pay the acceptor at their agent's rebate rate and put
    /// the unpaid part of the face value back into circulation.
    pub async fn complete_task(&self, task_id: DbId) -> EngineResult<CompletionReport> {
        let task = self.peek_task(task_id).await?;
        ensure_completable(&task)?;
        if task.is_bonus_pool {
            return self.complete_bonus_task(task_id).await;
        }

        let student_id = task.target_student_id.ok_or_else(|| {
            CoreError::Internal(format!("Personal task {task_id} has no target student"))
        })?;
        let earner = task.acceptor_id().unwrap_or(student_id);
        let rate = self.rebate_rate(earner).await;
        let now = self.now();

        let mut tx = self.store.begin().await?;
        let mut pool = tx.lock_pool(student_id).await?.ok_or(CoreError::NotFound {
            entity: "subsidy_pool",
            id: student_id,
        })?;
        let task = tx.lock_task(task_id).await?.ok_or(CoreError::NotFound {
            entity: "task",
            id: task_id,
        })?;
        ensure_completable(&task)?;

        let payout = Payout::compute(task.commission, rate);
        let task = tx
            .transition_task(
                task_id,
                &state_machine::sources_of(TaskStatus::Completed),
                &TaskChange::complete(payout.student_income, now),
            )
            .await?
            .ok_or_else(|| CoreError::Conflict(format!("Task {task_id} changed concurrently")))?;

        let clamp = pool.record_completion(&payout);
        audit::pool_clamp(&pool, clamp, "complete");
        tx.save_pool(&pool).await?;
        audit::check_pool(&pool, "complete");
        tx.commit().await?;

        let cross_day = self.config.calendar.is_before_today(task.created_at, now);
        tracing::info!(
            task_id,
            student_id,
            face_value = %payout.face_value,
            income = %payout.student_income,
            returned = %payout.remaining_value,
            cross_day,
            "Virtual task completed"
        );

        let mut report = CompletionReport {
            task,
            payout,
            cross_day,
            pool: None,
            bonus_pool: None,
            regeneration: None,
            bonus_generation: None,
            warning: None,
        };
        if !cross_day && payout.remaining_value > Decimal::ZERO {
            let followup = self
                .regenerate_after(student_id, RegenerationTrigger::Completion)
                .await;
            if let Some(regen) = &followup.regeneration {
                pool.remaining_amount = regen.remaining_amount;
                pool.allocated_amount = pool.total_subsidy - regen.remaining_amount;
            }
            report.regeneration = followup.regeneration;
            report.warning = followup.warning;
        }
        report.pool = Some(pool);
        Ok(report)
    }

    /// Read a task without holding any lock.
    pub(crate) async fn peek_task(&self, task_id: DbId) -> EngineResult<TaskRecord> {
        let mut tx = self.store.begin().await?;
        Ok(tx.find_task(task_id).await?.ok_or(CoreError::NotFound {
            entity: "task",
            id: task_id,
        })?)
    }

    pub async fn get_task(&self, task_id: DbId) -> EngineResult<TaskRecord> {
        self.peek_task(task_id).await
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    /// Return the value of expired personal tasks to their pools and
    /// regenerate. Each student is processed in a transaction of its own.
    pub async fn expire_sweep(&self) -> EngineResult<ExpirySweepReport> {
        let now = self.now();
        let students = {
            let mut tx = self.store.begin().await?;
            tx.students_with_expired_tasks(now).await?
        };

        let mut report = ExpirySweepReport {
            returned_amount: Decimal::ZERO,
            ..Default::default()
        };
        for student_id in students {
            let expired = match self.expire_student(student_id).await {
                Ok(Some(expired)) => expired,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(student_id, error = %e, "Expiry failed for student");
                    report.failures.push(SweepFailure {
                        id: student_id.to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            report.students += 1;
            report.deleted_tasks += expired.deleted;
            report.recycled_tasks += expired.recycled;
            report.returned_amount += expired.returned;

            if expired.has_pool {
                let followup = self
                    .regenerate_after(student_id, RegenerationTrigger::Expiry)
                    .await;
                if let Some(regen) = followup.regeneration {
                    report.regenerated_tasks += regen.created_tasks;
                }
                report.warnings.extend(followup.warning);
            }
        }

        if report.students > 0 || !report.failures.is_empty() {
            tracing::info!(
                students = report.students,
                deleted = report.deleted_tasks,
                recycled = report.recycled_tasks,
                returned = %report.returned_amount,
                regenerated = report.regenerated_tasks,
                failures = report.failures.len(),
                "Expiry sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire_student(&self, student_id: DbId) -> EngineResult<Option<StudentExpiry>> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let mut pool = tx.lock_pool(student_id).await?;
        let tasks = tx.lock_expired_student_tasks(student_id, now).await?;
        let batch = ExpiryBatch::collect(&tasks, now);
        if batch.is_empty() {
            return Ok(None);
        }

        tx.release_task_images(&batch.delete_ids).await?;
        tx.delete_tasks(&batch.delete_ids).await?;
        tx.mark_tasks_recycled(&batch.recycle_ids, now).await?;

        match pool.as_mut() {
            Some(pool) => {
                let clamp = pool.record_expiry_return(batch.returned_value);
                audit::pool_clamp(pool, clamp, "expiry_return");
                tx.save_pool(pool).await?;
                audit::check_pool(pool, "expiry_return");
            }
            None => tracing::warn!(
                student_id,
                amount = %batch.returned_value,
                "Expired tasks have no active pool, value dropped"
            ),
        }
        tx.commit().await?;

        tracing::debug!(
            student_id,
            deleted = batch.delete_ids.len(),
            recycled = batch.recycle_ids.len(),
            returned = %batch.returned_value,
            "Expired tasks returned to pool"
        );
        Ok(Some(StudentExpiry {
            deleted: batch.delete_ids.len(),
            recycled: batch.recycle_ids.len(),
            returned: batch.returned_value,
            has_pool: pool.is_some(),
        }))
    }

    /// Complete tasks that stayed submitted longer than the confirmation delay.
    pub async fn auto_confirm_sweep(&self) -> EngineResult<AutoConfirmReport> {
        let cutoff = self.now() - self.config.auto_confirm_after;
        let due = {
            let mut tx = self.store.begin().await?;
            tx.submitted_tasks_due(cutoff, self.config.auto_confirm_batch)
                .await?
        };

        let mut report = AutoConfirmReport::default();
        for task_id in due {
            match self.complete_task(task_id).await {
                Ok(completion) => {
                    report.confirmed += 1;
                    report.warnings.extend(completion.warning);
                }
                Err(e) => {
                    tracing::error!(task_id, error = %e, "Auto-confirmation failed");
                    report.failures.push(SweepFailure {
                        id: task_id.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        if report.confirmed > 0 {
            tracing::info!(confirmed = report.confirmed, "Submitted tasks auto-confirmed");
        }
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Student actions
    // -----------------------------------------------------------------------

    /// Claim an open task. Exactly one of several concurrent callers wins.
    pub async fn accept_task(&self, task_id: DbId, student_id: DbId) -> EngineResult<TaskRecord> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let task = tx.lock_task(task_id).await?.ok_or(CoreError::NotFound {
            entity: "task",
            id: task_id,
        })?;
        if task.status != TaskStatus::Unaccepted {
            return Err(CoreError::Conflict(format!("Task {task_id} was already taken")).into());
        }
        if task.end_date <= now {
            return Err(CoreError::InvalidState(format!("Task {task_id} has expired")).into());
        }

        if task.is_bonus_pool {
            let settings = tx.load_settings().await?;
            let today = self.today();
            if !settings.bonus_pool_enabled || task.bonus_pool_date != Some(today) {
                return Err(
                    CoreError::Forbidden(format!("Bonus task {task_id} is not open today")).into(),
                );
            }
            if !self.bonus_access(tx.as_mut(), student_id, today).await? {
                return Err(CoreError::Forbidden(
                    "Bonus tasks unlock after reaching yesterday's target".into(),
                )
                .into());
            }
        } else if task.target_student_id != Some(student_id) {
            return Err(CoreError::Forbidden(format!(
                "Task {task_id} belongs to another student"
            ))
            .into());
        }

        let task = tx
            .transition_task(
                task_id,
                &[TaskStatus::Unaccepted],
                &TaskChange::accept(student_id, now),
            )
            .await?
            .ok_or_else(|| CoreError::Conflict(format!("Task {task_id} was already taken")))?;
        tx.commit().await?;

        tracing::info!(task_id, student_id, bonus = task.is_bonus_pool, "Task accepted");
        Ok(task)
    }

    pub async fn start_task(&self, task_id: DbId, student_id: DbId) -> EngineResult<TaskRecord> {
        self.advance_task(
            task_id,
            student_id,
            &[TaskStatus::Accepted],
            TaskChange::to(TaskStatus::InProgress),
        )
        .await
    }

    pub async fn submit_task(&self, task_id: DbId, student_id: DbId) -> EngineResult<TaskRecord> {
        let now = self.now();
        self.advance_task(
            task_id,
            student_id,
            &[TaskStatus::Accepted, TaskStatus::InProgress],
            TaskChange::submit(now),
        )
        .await
    }

    /// Move a task the student already holds one step along.
    async fn advance_task(
        &self,
        task_id: DbId,
        student_id: DbId,
        from: &[TaskStatus],
        change: TaskChange,
    ) -> EngineResult<TaskRecord> {
        let mut tx = self.store.begin().await?;
        let task = tx.lock_task(task_id).await?.ok_or(CoreError::NotFound {
            entity: "task",
            id: task_id,
        })?;
        if task.acceptor_id() != Some(student_id) {
            return Err(
                CoreError::Forbidden(format!("Task {task_id} is not held by student {student_id}"))
                    .into(),
            );
        }
        let updated = tx
            .transition_task(task_id, from, &change)
            .await?
            .ok_or_else(|| -> EngineError {
                CoreError::InvalidState(format!(
                    "Cannot move task {task_id} from {} to {}",
                    task.status.label(),
                    change.status.label()
                ))
                .into()
            })?;
        tx.commit().await?;

        tracing::info!(task_id, student_id, status = updated.status.label(), "Task advanced");
        Ok(updated)
    }

    pub async fn visible_tasks(&self, student_id: DbId) -> EngineResult<StudentTaskView> {
        let today = self.today();
        let mut tx = self.store.begin().await?;
        let settings = tx.load_settings().await?;
        let (bonus, personal): (Vec<_>, Vec<_>) = tx
            .student_tasks(student_id)
            .await?
            .into_iter()
            .partition(|t| t.is_bonus_pool);

        let bonus_access =
            settings.bonus_pool_enabled && self.bonus_access(tx.as_mut(), student_id, today).await?;
        let mut bonus = bonus;
        if bonus_access {
            bonus.extend(
                tx.open_bonus_tasks(today)
                    .await?
                    .into_iter()
                    .filter(|t| t.status == TaskStatus::Unaccepted),
            );
        }

        Ok(StudentTaskView {
            student_id,
            personal,
            bonus,
            bonus_access,
        })
    }
}
