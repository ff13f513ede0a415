//! Subsidy pool operations: import, reset, deletion and task regeneration.
//!
//! A pool mutation always runs in one store transaction with the pool row
//! locked. Follow-up generation after an import, completion or expiry runs
//! in a transaction of its own so that a generation failure never undoes the
//! operation that triggered it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use vorder_core::error::CoreError;
use vorder_core::ledger::{NewPool, PoolSnapshot, PoolStatus};
use vorder_core::money::round_money;
use vorder_core::settings::RuntimeSettings;
use vorder_core::splitter::{split, split_on_demand};
use vorder_core::store::StoreTx;
use vorder_core::types::{DbId, Money, Timestamp};

use crate::allocator::{AllocationOutcome, TaskTarget};
use crate::audit;
use crate::{EngineResult, VirtualOrderEngine};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How much of the remaining balance to turn into tasks at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Split the whole remaining balance.
    #[default]
    Full,
    /// Emit at most two tasks and keep the rest for later.
    OnDemand,
}

/// What caused a regeneration; decides which runtime switch applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationTrigger {
    Import,
    Completion,
    Expiry,
    Manual,
}

impl RegenerationTrigger {
    pub fn allowed(self, settings: &RuntimeSettings) -> bool {
        settings.generation_enabled
            && match self {
                RegenerationTrigger::Import | RegenerationTrigger::Manual => true,
                RegenerationTrigger::Completion => settings.value_recycling_enabled,
                RegenerationTrigger::Expiry => settings.expired_regeneration_enabled,
            }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegenerationReport {
    pub student_id: DbId,
    pub trigger: RegenerationTrigger,
    pub mode: GenerationMode,
    /// Generation was switched off for this trigger.
    pub skipped: bool,
    pub created_tasks: usize,
    pub generated_amount: Money,
    pub shortfall_count: usize,
    pub shortfall_amount: Money,
    /// Pool balance left after generation.
    pub remaining_amount: Money,
}

/// Result of a follow-up generation. Failures become a warning instead of
/// an error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Followup {
    pub regeneration: Option<RegenerationReport>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubsidyImportRow {
    pub student_id: DbId,
    pub student_name: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    /// No pool and a zero amount.
    Skipped,
    Created,
    /// Same amount as the live pool; only the batch tag changed.
    Unchanged,
    Reset,
    Deleted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub student_id: DbId,
    pub action: ImportAction,
    pub pool: Option<PoolSnapshot>,
    /// Unaccepted tasks removed by a reset or delete.
    pub cancelled_tasks: usize,
    #[serde(flatten)]
    pub followup: Followup,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    pub student_id: DbId,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchImportReport {
    pub import_batch: Option<String>,
    pub processed: usize,
    pub created: usize,
    pub unchanged: usize,
    pub reset: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: Vec<ImportFailure>,
    pub results: Vec<ImportResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolChange {
    pub pool: PoolSnapshot,
    pub cancelled_tasks: usize,
    pub returned_amount: Money,
    #[serde(flatten)]
    pub followup: Followup,
}

/// A pool with the face value of its unsettled tasks.
#[derive(Debug, Clone, Serialize)]
pub struct PoolView {
    #[serde(flatten)]
    pub pool: PoolSnapshot,
    pub open_task_value: Money,
    /// Deviation of `consumed + open + forfeited + remaining` from the total.
    pub settlement_gap: Money,
}

/// Unaccepted tasks removed from a student's pool.
struct Cancelled {
    count: usize,
    face_value: Money,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl VirtualOrderEngine {
    /// Apply one imported subsidy amount to the student's pool.
    pub async fn import_subsidy(
        &self,
        row: &SubsidyImportRow,
        import_batch: Option<&str>,
    ) -> EngineResult<ImportResult> {
        let amount = round_money(row.amount);
        if amount < Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "Subsidy amount for student {} must not be negative",
                row.student_id
            ))
            .into());
        }
        let student_id = row.student_id;
        let batch = import_batch.map(str::to_string);

        let mut tx = self.store.begin().await?;
        let existing = tx.lock_pool(student_id).await?;

        let (action, pool, cancelled) = match existing {
            None if amount.is_zero() => {
                return Ok(ImportResult {
                    student_id,
                    action: ImportAction::Skipped,
                    pool: None,
                    cancelled_tasks: 0,
                    followup: Followup::default(),
                });
            }
            None => {
                let pool = tx
                    .insert_pool(&NewPool {
                        student_id,
                        student_name: row.student_name.clone(),
                        total_subsidy: amount,
                        import_batch: batch,
                    })
                    .await?;
                (ImportAction::Created, Some(pool), 0)
            }
            Some(pool) if amount.is_zero() => {
                let cancelled = self.cancel_unaccepted(tx.as_mut(), student_id).await?;
                tx.delete_pool(pool.id).await?;
                (ImportAction::Deleted, None, cancelled.count)
            }
            Some(mut pool) if pool.total_subsidy == amount => {
                pool.import_batch = batch;
                tx.save_pool(&pool).await?;
                (ImportAction::Unchanged, Some(pool), 0)
            }
            Some(mut pool) => {
                let cancelled = self.cancel_unaccepted(tx.as_mut(), student_id).await?;
                let claimed = tx.claimed_student_value(student_id).await?;
                let clamp = pool.reset(amount, claimed);
                audit::pool_clamp(&pool, clamp, "import_reset");
                pool.student_name = row.student_name.clone();
                pool.import_batch = batch;
                tx.save_pool(&pool).await?;
                audit::check_pool(&pool, "import_reset");
                (ImportAction::Reset, Some(pool), cancelled.count)
            }
        };
        tx.commit().await?;

        tracing::info!(
            student_id,
            amount = %amount,
            action = ?action,
            cancelled_tasks = cancelled,
            "Subsidy imported"
        );

        let mut result = ImportResult {
            student_id,
            action,
            pool,
            cancelled_tasks: cancelled,
            followup: Followup::default(),
        };
        if matches!(action, ImportAction::Created | ImportAction::Reset) {
            result.followup = self
                .regenerate_after(student_id, RegenerationTrigger::Import)
                .await;
            if let Some(report) = &result.followup.regeneration {
                if let Some(pool) = result.pool.as_mut() {
                    pool.remaining_amount = report.remaining_amount;
                    pool.allocated_amount = pool.total_subsidy - report.remaining_amount;
                }
            }
        }
        Ok(result)
    }

    /// Import many rows; one failing row never stops the rest.
    pub async fn import_batch(
        &self,
        rows: &[SubsidyImportRow],
        import_batch: Option<&str>,
    ) -> BatchImportReport {
        let mut report = BatchImportReport {
            import_batch: import_batch.map(str::to_string),
            ..Default::default()
        };
        for row in rows {
            report.processed += 1;
            match self.import_subsidy(row, import_batch).await {
                Ok(result) => {
                    match result.action {
                        ImportAction::Created => report.created += 1,
                        ImportAction::Unchanged => report.unchanged += 1,
                        ImportAction::Reset => report.reset += 1,
                        ImportAction::Deleted => report.deleted += 1,
                        ImportAction::Skipped => report.skipped += 1,
                    }
                    report.results.push(result);
                }
                Err(e) => {
                    tracing::error!(
                        student_id = row.student_id,
                        error = %e,
                        "Subsidy import failed"
                    );
                    report.failed.push(ImportFailure {
                        student_id: row.student_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            batch = ?report.import_batch,
            processed = report.processed,
            created = report.created,
            reset = report.reset,
            deleted = report.deleted,
            failed = report.failed.len(),
            "Subsidy batch imported"
        );
        report
    }

    /// Start the pool over from its total: clear completion counters, drop
    /// unaccepted tasks and generate afresh.
    pub async fn reset_pool(&self, student_id: DbId) -> EngineResult<PoolChange> {
        let mut tx = self.store.begin().await?;
        let mut pool = tx
            .lock_pool(student_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "subsidy_pool",
                id: student_id,
            })?;
        let cancelled = self.cancel_unaccepted(tx.as_mut(), student_id).await?;
        let claimed = tx.claimed_student_value(student_id).await?;
        let total = pool.total_subsidy;
        let clamp = pool.reset(total, claimed);
        audit::pool_clamp(&pool, clamp, "reset");
        tx.save_pool(&pool).await?;
        audit::check_pool(&pool, "reset");
        tx.commit().await?;

        tracing::info!(student_id, cancelled_tasks = cancelled.count, "Subsidy pool reset");

        let followup = self
            .regenerate_after(student_id, RegenerationTrigger::Manual)
            .await;
        if let Some(report) = &followup.regeneration {
            pool.remaining_amount = report.remaining_amount;
            pool.allocated_amount = pool.total_subsidy - report.remaining_amount;
        }
        Ok(PoolChange {
            pool,
            cancelled_tasks: cancelled.count,
            returned_amount: cancelled.face_value,
            followup,
        })
    }

    /// Soft-delete the student's pool and cancel their unaccepted tasks.
    pub async fn delete_pool(&self, student_id: DbId) -> EngineResult<PoolChange> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let mut pool = tx
            .lock_pool(student_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "subsidy_pool",
                id: student_id,
            })?;
        let cancelled = self.cancel_unaccepted(tx.as_mut(), student_id).await?;
        tx.soft_delete_pool(pool.id, now).await?;
        tx.commit().await?;

        pool.status = PoolStatus::Deleted;
        tracing::info!(student_id, cancelled_tasks = cancelled.count, "Subsidy pool deleted");
        Ok(PoolChange {
            pool,
            cancelled_tasks: cancelled.count,
            returned_amount: cancelled.face_value,
            followup: Followup::default(),
        })
    }

    /// Withdraw the student's unaccepted tasks and split the balance again.
    ///
    /// Runs as a single transaction: if nothing can be allocated the
    /// withdrawn tasks stay in place.
    pub async fn reallocate(
        &self,
        student_id: DbId,
        mode: GenerationMode,
    ) -> EngineResult<PoolChange> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let settings = tx.load_settings().await?;
        if !RegenerationTrigger::Manual.allowed(&settings) {
            return Err(
                CoreError::InvalidState("Virtual task generation is disabled".into()).into(),
            );
        }

        let mut pool = tx
            .lock_pool(student_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "subsidy_pool",
                id: student_id,
            })?;
        let cancelled = self.cancel_unaccepted(tx.as_mut(), student_id).await?;
        let clamp = pool.record_expiry_return(cancelled.face_value);
        audit::pool_clamp(&pool, clamp, "reallocate_return");
        if pool.remaining_amount <= Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "Student {student_id} has no remaining subsidy to allocate"
            ))
            .into());
        }

        let outcome = self.generate_for_pool(tx.as_mut(), &mut pool, mode, now).await?;
        tx.save_pool(&pool).await?;
        audit::check_pool(&pool, "reallocate");
        tx.commit().await?;

        tracing::info!(
            student_id,
            mode = ?mode,
            cancelled_tasks = cancelled.count,
            created_tasks = outcome.tasks.len(),
            generated = %outcome.generated_amount,
            "Subsidy pool reallocated"
        );
        let regeneration = report(student_id, RegenerationTrigger::Manual, mode, &outcome, &pool);
        Ok(PoolChange {
            pool,
            cancelled_tasks: cancelled.count,
            returned_amount: cancelled.face_value,
            followup: Followup {
                regeneration: Some(regeneration),
                warning: None,
            },
        })
    }

    pub async fn get_pool(&self, student_id: DbId) -> EngineResult<PoolView> {
        let mut tx = self.store.begin().await?;
        let pool = tx
            .find_pool(student_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "subsidy_pool",
                id: student_id,
            })?;
        let open_task_value = tx.open_student_value(student_id).await?;
        Ok(PoolView {
            settlement_gap: pool.settlement_gap(open_task_value),
            open_task_value,
            pool,
        })
    }

    pub async fn list_pools(
        &self,
        status: Option<PoolStatus>,
        limit: i64,
        offset: i64,
    ) -> EngineResult<Vec<PoolSnapshot>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_pools(status, limit, offset).await?)
    }

    // -----------------------------------------------------------------------
    // Regeneration
    // -----------------------------------------------------------------------

    /// Generate tasks from the pool's remaining balance in a transaction of
    /// its own.
    pub async fn regenerate(
        &self,
        student_id: DbId,
        mode: GenerationMode,
        trigger: RegenerationTrigger,
    ) -> EngineResult<RegenerationReport> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let settings = tx.load_settings().await?;
        let mut pool = tx
            .lock_pool(student_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "subsidy_pool",
                id: student_id,
            })?;

        if !trigger.allowed(&settings) {
            tracing::debug!(student_id, ?trigger, "Task generation disabled, skipping");
            let mut skipped = report(student_id, trigger, mode, &AllocationOutcome::empty(), &pool);
            skipped.skipped = true;
            return Ok(skipped);
        }

        let outcome = self.generate_for_pool(tx.as_mut(), &mut pool, mode, now).await?;
        tx.save_pool(&pool).await?;
        audit::check_pool(&pool, "regenerate");
        tx.commit().await?;

        tracing::info!(
            student_id,
            ?trigger,
            created_tasks = outcome.tasks.len(),
            generated = %outcome.generated_amount,
            remaining = %pool.remaining_amount,
            "Virtual tasks regenerated"
        );
        Ok(report(student_id, trigger, mode, &outcome, &pool))
    }

    /// On-demand regeneration whose failure is reported, not propagated.
    pub(crate) async fn regenerate_after(
        &self,
        student_id: DbId,
        trigger: RegenerationTrigger,
    ) -> Followup {
        match self
            .regenerate(student_id, GenerationMode::OnDemand, trigger)
            .await
        {
            Ok(report) => Followup {
                regeneration: Some(report),
                warning: None,
            },
            Err(e) => {
                tracing::warn!(student_id, ?trigger, error = %e, "Task regeneration failed");
                Followup {
                    regeneration: None,
                    warning: Some(format!("Task regeneration failed: {e}")),
                }
            }
        }
    }

    /// Split the pool's remaining balance, allocate it, and debit what was
    /// actually created. The caller saves the pool.
    pub(crate) async fn generate_for_pool(
        &self,
        tx: &mut dyn StoreTx,
        pool: &mut PoolSnapshot,
        mode: GenerationMode,
        now: Timestamp,
    ) -> EngineResult<AllocationOutcome> {
        let remaining = pool.remaining_amount;
        let values = self.with_rng(|rng| match mode {
            GenerationMode::Full => split(remaining, rng),
            GenerationMode::OnDemand => split_on_demand(remaining, rng),
        });
        if values.is_empty() {
            return Ok(AllocationOutcome::empty());
        }

        let outcome = self
            .allocate(tx, &values, TaskTarget::Student(pool.student_id), now)
            .await?;
        let clamp = pool.debit_generated(outcome.generated_amount);
        audit::pool_clamp(pool, clamp, "debit_generated");
        pool.last_allocation_at = Some(now);
        Ok(outcome)
    }

    /// Delete the student's unaccepted personal tasks, images released first.
    async fn cancel_unaccepted(
        &self,
        tx: &mut dyn StoreTx,
        student_id: DbId,
    ) -> EngineResult<Cancelled> {
        let tasks = tx.lock_unaccepted_student_tasks(student_id).await?;
        if tasks.is_empty() {
            return Ok(Cancelled {
                count: 0,
                face_value: Decimal::ZERO,
            });
        }
        let ids: Vec<DbId> = tasks.iter().map(|t| t.id).collect();
        let face_value = tasks.iter().map(|t| t.commission).sum();
        tx.release_task_images(&ids).await?;
        tx.delete_tasks(&ids).await?;
        Ok(Cancelled {
            count: ids.len(),
            face_value,
        })
    }
}

fn report(
    student_id: DbId,
    trigger: RegenerationTrigger,
    mode: GenerationMode,
    outcome: &AllocationOutcome,
    pool: &PoolSnapshot,
) -> RegenerationReport {
    RegenerationReport {
        student_id,
        trigger,
        mode,
        skipped: false,
        created_tasks: outcome.tasks.len(),
        generated_amount: outcome.generated_amount,
        shortfall_count: outcome.shortfall_count,
        shortfall_amount: outcome.shortfall_amount,
        remaining_amount: pool.remaining_amount,
    }
}
