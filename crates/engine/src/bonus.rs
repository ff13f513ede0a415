//! Daily bonus pool: achievements, pool funding, shared task generation,
//! completion and expiry.
//!
//! The bonus pool of a date is funded once per day from the unspent subsidy
//! of students who missed the previous day's target, from personal tasks
//! that went stale, and from whatever the previous day's bonus pool left
//! unused. Only students who achieved the previous day's target may take
//! its tasks.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use vorder_core::bonus::{has_bonus_access, AchievementSummary, BonusPoolSnapshot, DailyAchievement};
use vorder_core::error::CoreError;
use vorder_core::ledger::{Payout, PoolSnapshot};
use vorder_core::lifecycle::ensure_completable;
use vorder_core::splitter::bonus_denomination;
use vorder_core::store::{StoreTx, TaskStatusCounts};
use vorder_core::task::{state_machine, TaskChange, TaskStatus};
use vorder_core::types::{DbId, Money};

use crate::allocator::TaskTarget;
use crate::lifecycle::{CompletionReport, SweepFailure};
use crate::{audit, EngineError, EngineResult, VirtualOrderEngine};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BonusPoolUpdate {
    pub pool: BonusPoolSnapshot,
    /// Students whose unspent subsidy moved into the pool.
    pub forfeited_students: usize,
    pub forfeited_amount: Money,
    pub stale_tasks: usize,
    pub stale_amount: Money,
    /// Previous day's bonus tasks dropped unaccepted.
    pub dropped_bonus_tasks: usize,
    pub carried_forward: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct BonusGenerationReport {
    pub pool_date: NaiveDate,
    pub requested: usize,
    pub created_tasks: usize,
    pub generated_amount: Money,
    /// Why nothing was generated, when nothing was.
    pub skipped: Option<String>,
    pub available_after: Money,
}

impl BonusGenerationReport {
    fn nothing(
        pool_date: NaiveDate,
        requested: usize,
        reason: impl Into<String>,
        available: Money,
    ) -> Self {
        Self {
            pool_date,
            requested,
            created_tasks: 0,
            generated_amount: Decimal::ZERO,
            skipped: Some(reason.into()),
            available_after: available,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BonusExpiryReport {
    pub dates: usize,
    pub expired_tasks: usize,
    pub released_amount: Money,
    pub regenerated_tasks: usize,
    pub failures: Vec<SweepFailure>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyRunReport {
    pub process_date: NaiveDate,
    pub pool_date: NaiveDate,
    pub achievements: AchievementSummary,
    pub pool: Option<BonusPoolUpdate>,
    pub generation: Option<BonusGenerationReport>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BonusStatus {
    pub pool_date: NaiveDate,
    pub enabled: bool,
    pub pool: Option<BonusPoolSnapshot>,
    pub available: Money,
    pub task_counts: TaskStatusCounts,
    /// Students allowed to take this date's tasks.
    pub qualified_students: usize,
}

fn previous_day(date: NaiveDate) -> EngineResult<NaiveDate> {
    date.pred_opt()
        .ok_or_else(|| CoreError::Validation(format!("No day before {date}")).into())
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl VirtualOrderEngine {
    /// Whether the student may see and take bonus tasks dated `date`.
    pub async fn check_access(&self, student_id: DbId, date: NaiveDate) -> EngineResult<bool> {
        let mut tx = self.store.begin().await?;
        let settings = tx.load_settings().await?;
        Ok(settings.bonus_pool_enabled && self.bonus_access(tx.as_mut(), student_id, date).await?)
    }

    /// Achievement gate alone, ignoring the runtime switch.
    pub(crate) async fn bonus_access(
        &self,
        tx: &mut dyn StoreTx,
        student_id: DbId,
        date: NaiveDate,
    ) -> EngineResult<bool> {
        let Some(yesterday) = date.pred_opt() else {
            return Ok(false);
        };
        let achievement = tx.find_achievement(student_id, yesterday).await?;
        Ok(has_bonus_access(achievement.as_ref()))
    }

    /// Record, for every student with a pool open on `date`, whether their
    /// income that day reached the daily target.
    pub async fn update_daily_achievements(
        &self,
        date: NaiveDate,
    ) -> EngineResult<AchievementSummary> {
        let (start, end) = self.config.calendar.day_range(date);
        let mut tx = self.store.begin().await?;
        let settings = tx.load_settings().await?;
        let pools: Vec<PoolSnapshot> = tx
            .list_active_pools()
            .await?
            .into_iter()
            .filter(|p| p.created_at < end)
            .collect();

        let mut records = Vec::with_capacity(pools.len());
        for pool in &pools {
            let income = tx
                .settled_income_between(pool.student_id, start, end)
                .await?;
            let record = DailyAchievement::evaluate(
                pool.student_id,
                pool.student_name.clone(),
                date,
                settings.daily_target,
                income,
            );
            tx.upsert_achievement(&record).await?;
            records.push(record);
        }
        tx.commit().await?;

        let summary = AchievementSummary::from_records(date, &records);
        tracing::info!(
            %date,
            students = summary.total_students,
            achieved = summary.achieved_students,
            target = %settings.daily_target,
            "Daily achievements updated"
        );
        Ok(summary)
    }

    /// Fund the bonus pool of `date` from the previous day's leftovers.
    ///
    /// Safe to run more than once for the same date: balances already moved
    /// are not moved again and the carry-forward is recomputed.
    pub async fn create_or_update_pool(&self, date: NaiveDate) -> EngineResult<BonusPoolUpdate> {
        let yesterday = previous_day(date)?;
        let now = self.now();
        let day_start = self.config.calendar.start_of(date);

        let mut tx = self.store.begin().await?;
        let achieved: HashSet<DbId> = tx
            .achievements_on(yesterday)
            .await?
            .into_iter()
            .filter(|a| a.is_achieved)
            .map(|a| a.student_id)
            .collect();

        // Student pools first, then bonus pools, then tasks.
        let mut pools: BTreeMap<DbId, PoolSnapshot> = tx
            .lock_active_pools(day_start)
            .await?
            .into_iter()
            .map(|p| (p.student_id, p))
            .collect();
        let mut changed: HashSet<DbId> = HashSet::new();

        let mut forfeited_students = 0;
        let mut forfeited_amount = Decimal::ZERO;
        for pool in pools.values_mut() {
            if achieved.contains(&pool.student_id) {
                continue;
            }
            let amount = pool.forfeit_remaining();
            if amount > Decimal::ZERO {
                forfeited_students += 1;
                forfeited_amount += amount;
                changed.insert(pool.student_id);
            }
        }

        let mut previous = tx.lock_bonus_pool(yesterday).await?;
        let mut pool = match tx.lock_bonus_pool(date).await? {
            Some(pool) => pool,
            None => tx.insert_bonus_pool(date).await?,
        };

        let stale = tx.lock_stale_student_tasks(day_start, now).await?;
        let stale_ids: Vec<DbId> = stale.iter().map(|t| t.id).collect();
        let mut stale_amount = Decimal::ZERO;
        if !stale_ids.is_empty() {
            tx.release_task_images(&stale_ids).await?;
            tx.delete_tasks(&stale_ids).await?;
        }
        for task in &stale {
            stale_amount += task.commission;
            let owner = task.target_student_id.and_then(|id| pools.get_mut(&id));
            match owner {
                Some(owner) => {
                    owner.forfeit_expired(task.commission);
                    changed.insert(owner.student_id);
                }
                None => tracing::warn!(
                    task_id = task.id,
                    student_id = ?task.target_student_id,
                    "Stale task has no active pool"
                ),
            }
        }

        let mut dropped_bonus_tasks = 0;
        if let Some(previous) = previous.as_mut() {
            let open = tx.lock_open_bonus_tasks(yesterday).await?;
            if !open.is_empty() {
                let ids: Vec<DbId> = open.iter().map(|t| t.id).collect();
                let value: Money = open.iter().map(|t| t.commission).sum();
                tx.release_task_images(&ids).await?;
                tx.delete_tasks(&ids).await?;
                let clamp = previous.record_expiry(value);
                audit::bonus_clamp(previous, clamp, "drop_previous_day");
                tx.save_bonus_pool(previous).await?;
                dropped_bonus_tasks = ids.len();
            }
        }

        let carried_forward = previous
            .as_ref()
            .map_or(Decimal::ZERO, BonusPoolSnapshot::available);
        let clamp = pool.rebase(carried_forward, forfeited_amount + stale_amount);
        audit::bonus_clamp(&pool, clamp, "rebase");
        tx.save_bonus_pool(&pool).await?;

        for student_id in &changed {
            if let Some(student_pool) = pools.get(student_id) {
                tx.save_pool(student_pool).await?;
                audit::check_pool(student_pool, "forfeit");
            }
        }
        tx.commit().await?;

        tracing::info!(
            %date,
            total = %pool.total_amount,
            carried_forward = %carried_forward,
            forfeited = %forfeited_amount,
            forfeited_students,
            stale = %stale_amount,
            dropped_bonus_tasks,
            "Bonus pool updated"
        );
        Ok(BonusPoolUpdate {
            pool,
            forfeited_students,
            forfeited_amount,
            stale_tasks: stale_ids.len(),
            stale_amount,
            dropped_bonus_tasks,
            carried_forward,
        })
    }

    /// Create up to `count` shared tasks against the bonus pool of `date`.
    ///
    /// Not generating anything is a normal outcome (switched off, nobody
    /// qualified, pool drained) and is reported, not raised.
    pub async fn generate_tasks(
        &self,
        date: NaiveDate,
        count: usize,
    ) -> EngineResult<BonusGenerationReport> {
        if date < self.today() {
            return Err(CoreError::Validation(format!(
                "Cannot generate bonus tasks for past date {date}"
            ))
            .into());
        }
        let yesterday = previous_day(date)?;
        let now = self.now();

        let mut tx = self.store.begin().await?;
        let settings = tx.load_settings().await?;
        if !settings.bonus_pool_enabled || !settings.generation_enabled {
            return Ok(BonusGenerationReport::nothing(
                date,
                count,
                "bonus pool disabled",
                Decimal::ZERO,
            ));
        }
        let qualified = tx
            .achievements_on(yesterday)
            .await?
            .iter()
            .filter(|a| a.is_achieved)
            .count();
        if qualified == 0 {
            return Ok(BonusGenerationReport::nothing(
                date,
                count,
                "no qualified students",
                Decimal::ZERO,
            ));
        }

        let mut pool = tx
            .lock_bonus_pool(date)
            .await?
            .ok_or_else(|| CoreError::InvalidState(format!("No bonus pool for {date}")))?;

        let values: Vec<Money> = self.with_rng(|rng| {
            let mut available = pool.available();
            let mut values = Vec::with_capacity(count);
            while values.len() < count {
                let Some(value) = bonus_denomination(available, rng) else {
                    break;
                };
                available -= value;
                values.push(value);
            }
            values
        });
        if values.is_empty() {
            return Ok(BonusGenerationReport::nothing(
                date,
                count,
                "bonus pool exhausted",
                pool.available(),
            ));
        }

        let outcome = match self
            .allocate(tx.as_mut(), &values, TaskTarget::BonusPool(date), now)
            .await
        {
            Ok(outcome) => outcome,
            Err(EngineError::Core(CoreError::ResourceExhausted(reason))) => {
                tracing::warn!(%date, %reason, "Bonus task generation skipped");
                return Ok(BonusGenerationReport::nothing(date, count, reason, pool.available()));
            }
            Err(e) => return Err(e),
        };
        pool.record_generated(outcome.generated_amount);
        tx.save_bonus_pool(&pool).await?;
        tx.commit().await?;

        tracing::info!(
            %date,
            created = outcome.tasks.len(),
            generated = %outcome.generated_amount,
            available = %pool.available(),
            "Bonus tasks generated"
        );
        Ok(BonusGenerationReport {
            pool_date: date,
            requested: count,
            created_tasks: outcome.tasks.len(),
            generated_amount: outcome.generated_amount,
            skipped: None,
            available_after: pool.available(),
        })
    }

    /// Settle a bonus task. The bonus pool pays only the real payout; the
    /// acceptor's own pool records the completion for reporting.
    pub async fn complete_bonus_task(&self, task_id: DbId) -> EngineResult<CompletionReport> {
        let task = self.peek_task(task_id).await?;
        ensure_completable(&task)?;
        if !task.is_bonus_pool {
            return Err(CoreError::Validation(format!("Task {task_id} is not a bonus task")).into());
        }
        let student_id = task.acceptor_id().ok_or_else(|| {
            CoreError::InvalidState(format!("Bonus task {task_id} has no acceptor"))
        })?;
        let pool_date = task.bonus_pool_date.ok_or_else(|| {
            CoreError::Internal(format!("Bonus task {task_id} has no pool date"))
        })?;
        let rate = self.rebate_rate(student_id).await;
        let now = self.now();

        let mut tx = self.store.begin().await?;
        let mut student_pool = tx.lock_pool(student_id).await?;
        let mut bonus_pool = tx
            .lock_bonus_pool(pool_date)
            .await?
            .ok_or_else(|| CoreError::InvalidState(format!("No bonus pool for {pool_date}")))?;
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

        let clamp = bonus_pool.record_completion(&payout);
        audit::bonus_clamp(&bonus_pool, clamp, "bonus_complete");
        tx.save_bonus_pool(&bonus_pool).await?;
        match student_pool.as_mut() {
            Some(pool) => {
                pool.record_bonus_completion(&payout);
                tx.save_pool(pool).await?;
            }
            None => tracing::warn!(task_id, student_id, "Bonus task acceptor has no active pool"),
        }
        tx.commit().await?;

        let cross_day = self.config.calendar.is_before_today(task.created_at, now);
        tracing::info!(
            task_id,
            student_id,
            %pool_date,
            face_value = %payout.face_value,
            income = %payout.student_income,
            "Bonus task completed"
        );

        let mut report = CompletionReport {
            task,
            payout,
            cross_day,
            pool: student_pool,
            bonus_pool: Some(bonus_pool),
            regeneration: None,
            bonus_generation: None,
            warning: None,
        };
        let recycling = self.settings().await.is_ok_and(|s| s.value_recycling_enabled);
        if !cross_day && recycling && pool_date == self.config.calendar.date_of(now) {
            match self.generate_tasks(pool_date, 1).await {
                Ok(generation) => report.bonus_generation = Some(generation),
                Err(e) => {
                    tracing::warn!(task_id, error = %e, "Bonus task regeneration failed");
                    report.warning = Some(format!("Bonus task regeneration failed: {e}"));
                }
            }
        }
        Ok(report)
    }

    /// Drop bonus tasks nobody took in time; today's pool gets replacements.
    pub async fn expire_bonus_sweep(&self) -> EngineResult<BonusExpiryReport> {
        let now = self.now();
        let today = self.config.calendar.date_of(now);
        let dates = {
            let mut tx = self.store.begin().await?;
            tx.bonus_dates_with_expired_tasks(now).await?
        };

        let mut report = BonusExpiryReport {
            released_amount: Decimal::ZERO,
            ..Default::default()
        };
        for date in dates {
            let (expired, value) = match self.expire_bonus_date(date).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(%date, error = %e, "Bonus expiry failed");
                    report.failures.push(SweepFailure {
                        id: date.to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            report.dates += 1;
            report.expired_tasks += expired;
            report.released_amount += value;

            if date == today && expired > 0 {
                match self.generate_tasks(date, expired).await {
                    Ok(generation) => report.regenerated_tasks += generation.created_tasks,
                    Err(e) => {
                        tracing::warn!(%date, error = %e, "Bonus task regeneration failed");
                        report.warnings.push(format!("Bonus regeneration for {date} failed: {e}"));
                    }
                }
            }
        }

        if report.dates > 0 {
            tracing::info!(
                dates = report.dates,
                expired = report.expired_tasks,
                released = %report.released_amount,
                regenerated = report.regenerated_tasks,
                "Bonus expiry sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire_bonus_date(&self, date: NaiveDate) -> EngineResult<(usize, Money)> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let mut pool = tx.lock_bonus_pool(date).await?;
        let tasks = tx.lock_expired_bonus_tasks(date, now).await?;
        if tasks.is_empty() {
            return Ok((0, Decimal::ZERO));
        }
        let ids: Vec<DbId> = tasks.iter().map(|t| t.id).collect();
        let value: Money = tasks.iter().map(|t| t.commission).sum();
        tx.release_task_images(&ids).await?;
        tx.delete_tasks(&ids).await?;

        if let Some(pool) = pool.as_mut() {
            let clamp = pool.record_expiry(value);
            audit::bonus_clamp(pool, clamp, "bonus_expiry");
            tx.save_bonus_pool(pool).await?;
        } else {
            tracing::warn!(%date, "Expired bonus tasks have no bonus pool");
        }
        tx.commit().await?;
        Ok((ids.len(), value))
    }

    /// The daily job: settle achievements for `process_date`, fund the next
    /// day's bonus pool and seed it with tasks.
    pub async fn run_daily(&self, process_date: NaiveDate) -> EngineResult<DailyRunReport> {
        let pool_date = process_date
            .succ_opt()
            .ok_or_else(|| CoreError::Validation(format!("No day after {process_date}")))?;
        let achievements = self.update_daily_achievements(process_date).await?;

        let mut report = DailyRunReport {
            process_date,
            pool_date,
            achievements,
            pool: None,
            generation: None,
            warnings: Vec::new(),
        };
        if !self.settings().await?.bonus_pool_enabled {
            tracing::info!(%process_date, "Bonus pool disabled, skipping pool update");
            return Ok(report);
        }

        report.pool = Some(self.create_or_update_pool(pool_date).await?);
        match self
            .generate_tasks(pool_date, self.config.bonus_initial_tasks)
            .await
        {
            Ok(generation) => report.generation = Some(generation),
            Err(e) => {
                tracing::warn!(%pool_date, error = %e, "Initial bonus task generation failed");
                report.warnings.push(format!("Bonus task generation failed: {e}"));
            }
        }
        Ok(report)
    }

    pub async fn bonus_status(&self, date: NaiveDate) -> EngineResult<BonusStatus> {
        let yesterday = previous_day(date)?;
        let mut tx = self.store.begin().await?;
        let settings = tx.load_settings().await?;
        let pool = tx.find_bonus_pool(date).await?;
        let task_counts = tx.bonus_task_counts(date).await?;
        let qualified_students = tx
            .achievements_on(yesterday)
            .await?
            .iter()
            .filter(|a| a.is_achieved)
            .count();
        Ok(BonusStatus {
            pool_date: date,
            enabled: settings.bonus_pool_enabled,
            available: pool.as_ref().map_or(Decimal::ZERO, BonusPoolSnapshot::available),
            pool,
            task_counts,
            qualified_students,
        })
    }

    pub async fn student_achievement(
        &self,
        student_id: DbId,
        date: NaiveDate,
    ) -> EngineResult<DailyAchievement> {
        let mut tx = self.store.begin().await?;
        Ok(tx
            .find_achievement(student_id, date)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "daily_achievement",
                id: student_id,
            })?)
    }

    pub async fn achievement_summary(&self, date: NaiveDate) -> EngineResult<AchievementSummary> {
        let mut tx = self.store.begin().await?;
        let records = tx.achievements_on(date).await?;
        Ok(AchievementSummary::from_records(date, &records))
    }
}
