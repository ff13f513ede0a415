//! Persistence and collaborator seams.
//!
//! The engine talks to storage only through these traits. A [`Store`] hands
//! out [`StoreTx`] units of work; every mutation of a pool happens inside one
//! after the pool row has been locked with one of the `lock_*` methods.
//! Dropping a transaction without calling [`StoreTx::commit`] rolls it back.
//!
//! Lock order inside one transaction: student pools (ascending student id),
//! then bonus pools (ascending date), then tasks.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::allocation::{NewVirtualService, ServiceLoad, UpdateVirtualService, VirtualService};
use crate::bonus::{BonusPoolSnapshot, DailyAchievement};
use crate::content::CategoryWeight;
use crate::ledger::{NewPool, PoolSnapshot, PoolStatus};
use crate::settings::RuntimeSettings;
use crate::task::{NewTask, TaskChange, TaskRecord, TaskStatus};
use crate::types::{DbId, Money, Timestamp};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A persisted row could not be mapped to a domain record.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Auxiliary records
// ---------------------------------------------------------------------------

/// An image reserved for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub id: DbId,
    pub category: Option<String>,
    pub file_url: String,
}

/// Open and completed work per virtual identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FounderTotals {
    pub service_id: DbId,
    pub open_tasks: i64,
    pub open_amount: Money,
    pub completed_tasks: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatusCounts {
    pub unaccepted: i64,
    pub accepted: i64,
    pub in_progress: i64,
    pub submitted: i64,
    pub completed: i64,
    pub terminated: i64,
}

impl TaskStatusCounts {
    pub fn add(&mut self, status: TaskStatus, n: i64) {
        match status {
            TaskStatus::Unaccepted => self.unaccepted += n,
            TaskStatus::Accepted => self.accepted += n,
            TaskStatus::InProgress => self.in_progress += n,
            TaskStatus::Submitted => self.submitted += n,
            TaskStatus::Completed => self.completed += n,
            TaskStatus::Terminated => self.terminated += n,
        }
    }

    pub fn total(&self) -> i64 {
        self.unaccepted
            + self.accepted
            + self.in_progress
            + self.submitted
            + self.completed
            + self.terminated
    }
}

/// Raw aggregates across all active pools and virtual tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewStats {
    pub students: i64,
    pub total_subsidy: Money,
    pub consumed_subsidy: Money,
    pub remaining_amount: Money,
    pub tasks_generated: i64,
    pub tasks_completed: i64,
    pub open_tasks: i64,
}

impl Default for OverviewStats {
    fn default() -> Self {
        Self {
            students: 0,
            total_subsidy: Decimal::ZERO,
            consumed_subsidy: Decimal::ZERO,
            remaining_amount: Decimal::ZERO,
            tasks_generated: 0,
            tasks_completed: 0,
            open_tasks: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// Resolves the rebate rate of a student's agent.
#[async_trait]
pub trait RebateSource: Send + Sync {
    /// `Ok(None)` when the student has no agent or the stored rate is unusable.
    async fn rebate_rate(&self, student_id: DbId) -> StoreResult<Option<Money>>;
}

/// One unit of work against storage.
#[async_trait]
pub trait StoreTx: Send {
    // -- Settings --
    async fn load_settings(&mut self) -> StoreResult<RuntimeSettings>;
    async fn save_settings(&mut self, settings: &RuntimeSettings) -> StoreResult<()>;

    // -- Subsidy pools --
    async fn find_pool(&mut self, student_id: DbId) -> StoreResult<Option<PoolSnapshot>>;
    /// Lock the student's active pool row.
    async fn lock_pool(&mut self, student_id: DbId) -> StoreResult<Option<PoolSnapshot>>;
    async fn insert_pool(&mut self, pool: &NewPool) -> StoreResult<PoolSnapshot>;
    async fn save_pool(&mut self, pool: &PoolSnapshot) -> StoreResult<()>;
    async fn delete_pool(&mut self, pool_id: DbId) -> StoreResult<()>;
    async fn soft_delete_pool(&mut self, pool_id: DbId, at: Timestamp) -> StoreResult<()>;
    async fn list_pools(
        &mut self,
        status: Option<PoolStatus>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<PoolSnapshot>>;
    async fn list_active_pools(&mut self) -> StoreResult<Vec<PoolSnapshot>>;
    /// Lock every active pool created before `created_before`, by student id.
    async fn lock_active_pools(
        &mut self,
        created_before: Timestamp,
    ) -> StoreResult<Vec<PoolSnapshot>>;

    // -- Tasks --
    async fn find_task(&mut self, task_id: DbId) -> StoreResult<Option<TaskRecord>>;
    async fn lock_task(&mut self, task_id: DbId) -> StoreResult<Option<TaskRecord>>;
    async fn insert_task(&mut self, task: &NewTask) -> StoreResult<TaskRecord>;
    /// Apply `change` only if the task's current status is one of `from`.
    async fn transition_task(
        &mut self,
        task_id: DbId,
        from: &[TaskStatus],
        change: &TaskChange,
    ) -> StoreResult<Option<TaskRecord>>;
    /// Hard delete. Image back-references must be released first.
    async fn delete_tasks(&mut self, task_ids: &[DbId]) -> StoreResult<u64>;
    async fn mark_tasks_recycled(&mut self, task_ids: &[DbId], at: Timestamp) -> StoreResult<u64>;
    async fn set_task_founder(
        &mut self,
        task_id: DbId,
        service_id: DbId,
        founder: &str,
    ) -> StoreResult<()>;
    /// Lock the student's own unaccepted virtual tasks.
    async fn lock_unaccepted_student_tasks(
        &mut self,
        student_id: DbId,
    ) -> StoreResult<Vec<TaskRecord>>;
    /// Face value of the student's accepted but unsettled virtual tasks.
    async fn claimed_student_value(&mut self, student_id: DbId) -> StoreResult<Money>;
    /// Face value of all the student's virtual tasks not yet settled.
    async fn open_student_value(&mut self, student_id: DbId) -> StoreResult<Money>;
    async fn students_with_expired_tasks(&mut self, now: Timestamp) -> StoreResult<Vec<DbId>>;
    /// Lock the student's unaccepted tasks past deadline and terminated
    /// tasks whose value was never returned.
    async fn lock_expired_student_tasks(
        &mut self,
        student_id: DbId,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>>;
    /// Unaccepted non-bonus tasks past deadline created before `created_before`.
    async fn lock_stale_student_tasks(
        &mut self,
        created_before: Timestamp,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>>;
    async fn bonus_dates_with_expired_tasks(
        &mut self,
        now: Timestamp,
    ) -> StoreResult<Vec<NaiveDate>>;
    async fn lock_expired_bonus_tasks(
        &mut self,
        pool_date: NaiveDate,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>>;
    async fn lock_open_bonus_tasks(&mut self, pool_date: NaiveDate)
        -> StoreResult<Vec<TaskRecord>>;
    async fn open_bonus_tasks(&mut self, pool_date: NaiveDate) -> StoreResult<Vec<TaskRecord>>;
    /// Submitted tasks waiting for confirmation since before `submitted_before`.
    async fn submitted_tasks_due(
        &mut self,
        submitted_before: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<DbId>>;
    async fn unaccepted_tasks_by_founder(&mut self, service_id: DbId)
        -> StoreResult<Vec<TaskRecord>>;
    /// Unsettled tasks the student sees: their own plus bonus tasks they took.
    async fn student_tasks(&mut self, student_id: DbId) -> StoreResult<Vec<TaskRecord>>;
    /// Real payout of the student's own tasks settled in `[from, to)`.
    /// Income from bonus tasks is excluded.
    async fn settled_income_between(
        &mut self,
        student_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Money>;
    async fn bonus_task_counts(&mut self, pool_date: NaiveDate) -> StoreResult<TaskStatusCounts>;

    // -- Images --
    /// Claim one available image, optionally restricted to a category.
    async fn reserve_image(&mut self, category: Option<&str>) -> StoreResult<Option<ImageRef>>;
    async fn attach_image(&mut self, image_id: DbId, task_id: DbId) -> StoreResult<()>;
    /// Null image back-references to these tasks and make the images available.
    async fn release_task_images(&mut self, task_ids: &[DbId]) -> StoreResult<u64>;
    async fn active_categories(&mut self) -> StoreResult<Vec<CategoryWeight>>;

    // -- Virtual services --
    /// Active identities with their current open-task counts.
    async fn service_loads(&mut self) -> StoreResult<Vec<ServiceLoad>>;
    async fn list_services(&mut self) -> StoreResult<Vec<VirtualService>>;
    async fn find_service(&mut self, service_id: DbId) -> StoreResult<Option<VirtualService>>;
    async fn insert_service(&mut self, new: &NewVirtualService) -> StoreResult<VirtualService>;
    async fn update_service(
        &mut self,
        service_id: DbId,
        update: &UpdateVirtualService,
    ) -> StoreResult<Option<VirtualService>>;
    async fn soft_delete_service(&mut self, service_id: DbId) -> StoreResult<bool>;
    async fn founder_totals(&mut self) -> StoreResult<Vec<FounderTotals>>;

    // -- Bonus pools and achievements --
    async fn find_bonus_pool(&mut self, pool_date: NaiveDate)
        -> StoreResult<Option<BonusPoolSnapshot>>;
    async fn lock_bonus_pool(&mut self, pool_date: NaiveDate)
        -> StoreResult<Option<BonusPoolSnapshot>>;
    async fn insert_bonus_pool(&mut self, pool_date: NaiveDate) -> StoreResult<BonusPoolSnapshot>;
    async fn save_bonus_pool(&mut self, pool: &BonusPoolSnapshot) -> StoreResult<()>;
    async fn find_achievement(
        &mut self,
        student_id: DbId,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyAchievement>>;
    async fn upsert_achievement(&mut self, achievement: &DailyAchievement) -> StoreResult<()>;
    async fn achievements_on(&mut self, date: NaiveDate) -> StoreResult<Vec<DailyAchievement>>;

    // -- Reporting --
    async fn overview(&mut self) -> StoreResult<OverviewStats>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
