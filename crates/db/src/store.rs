//! [`Store`] implementation backed by PostgreSQL.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Postgres, Transaction};
use vorder_core::allocation::{NewVirtualService, ServiceLoad, UpdateVirtualService, VirtualService};
use vorder_core::bonus::{BonusPoolSnapshot, DailyAchievement};
use vorder_core::content::CategoryWeight;
use vorder_core::ledger::{NewPool, PoolSnapshot, PoolStatus};
use vorder_core::rebate::parse_rebate_rate;
use vorder_core::settings::RuntimeSettings;
use vorder_core::store::{
    FounderTotals, ImageRef, OverviewStats, RebateSource, Store, StoreError, StoreResult, StoreTx,
    TaskStatusCounts,
};
use vorder_core::task::{NewTask, TaskChange, TaskRecord, TaskStatus};
use vorder_core::types::{DbId, Money, Timestamp};

use crate::models::stats;
use crate::models::task::into_records;
use crate::repositories::{
    BonusRepo, ConfigRepo, ImageRepo, StatsRepo, StudentRepo, SubsidyPoolRepo, TaskRepo,
    VirtualServiceRepo,
};
use crate::DbPool;

const CLAIMED: [TaskStatus; 3] = [
    TaskStatus::Accepted,
    TaskStatus::InProgress,
    TaskStatus::Submitted,
];

const UNSETTLED: [TaskStatus; 4] = [
    TaskStatus::Unaccepted,
    TaskStatus::Accepted,
    TaskStatus::InProgress,
    TaskStatus::Submitted,
];

/// Cheaply cloneable handle over the connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(StoreError::backend)?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

#[async_trait]
impl RebateSource for PgStore {
    async fn rebate_rate(&self, student_id: DbId) -> StoreResult<Option<Money>> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::backend)?;
        let raw = StudentRepo::agent_rebate(&mut conn, student_id)
            .await
            .map_err(StoreError::backend)?;
        Ok(raw.as_deref().and_then(parse_rebate_rate))
    }
}

/// One database transaction. Dropped without commit, sqlx rolls it back.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

fn pool_opt(row: Option<crate::models::pool::PoolRow>) -> StoreResult<Option<PoolSnapshot>> {
    row.map(PoolSnapshot::try_from).transpose()
}

fn pools(rows: Vec<crate::models::pool::PoolRow>) -> StoreResult<Vec<PoolSnapshot>> {
    rows.into_iter().map(PoolSnapshot::try_from).collect()
}

fn task_opt(row: Option<crate::models::task::TaskRow>) -> StoreResult<Option<TaskRecord>> {
    row.map(TaskRecord::try_from).transpose()
}

#[async_trait]
impl StoreTx for PgStoreTx {
    // -- Settings --

    async fn load_settings(&mut self) -> StoreResult<RuntimeSettings> {
        let pairs = ConfigRepo::all(&mut self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(RuntimeSettings::from_pairs(
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        ))
    }

    async fn save_settings(&mut self, settings: &RuntimeSettings) -> StoreResult<()> {
        for (key, value) in settings.to_pairs() {
            ConfigRepo::upsert(&mut self.tx, key, &value)
                .await
                .map_err(StoreError::backend)?;
        }
        Ok(())
    }

    // -- Subsidy pools --

    async fn find_pool(&mut self, student_id: DbId) -> StoreResult<Option<PoolSnapshot>> {
        pool_opt(
            SubsidyPoolRepo::find_active(&mut self.tx, student_id)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn lock_pool(&mut self, student_id: DbId) -> StoreResult<Option<PoolSnapshot>> {
        pool_opt(
            SubsidyPoolRepo::lock_active(&mut self.tx, student_id)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn insert_pool(&mut self, pool: &NewPool) -> StoreResult<PoolSnapshot> {
        SubsidyPoolRepo::insert(&mut self.tx, pool)
            .await
            .map_err(StoreError::backend)?
            .try_into()
    }

    async fn save_pool(&mut self, pool: &PoolSnapshot) -> StoreResult<()> {
        SubsidyPoolRepo::save(&mut self.tx, pool)
            .await
            .map_err(StoreError::backend)
    }

    async fn delete_pool(&mut self, pool_id: DbId) -> StoreResult<()> {
        SubsidyPoolRepo::delete(&mut self.tx, pool_id)
            .await
            .map_err(StoreError::backend)
    }

    async fn soft_delete_pool(&mut self, pool_id: DbId, at: Timestamp) -> StoreResult<()> {
        SubsidyPoolRepo::soft_delete(&mut self.tx, pool_id, at)
            .await
            .map_err(StoreError::backend)
    }

    async fn list_pools(
        &mut self,
        status: Option<PoolStatus>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<PoolSnapshot>> {
        pools(
            SubsidyPoolRepo::list(&mut self.tx, status.map(PoolStatus::as_str), limit, offset)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn list_active_pools(&mut self) -> StoreResult<Vec<PoolSnapshot>> {
        pools(
            SubsidyPoolRepo::list_active(&mut self.tx)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn lock_active_pools(
        &mut self,
        created_before: Timestamp,
    ) -> StoreResult<Vec<PoolSnapshot>> {
        pools(
            SubsidyPoolRepo::lock_active_created_before(&mut self.tx, created_before)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    // -- Tasks --

    async fn find_task(&mut self, task_id: DbId) -> StoreResult<Option<TaskRecord>> {
        task_opt(
            TaskRepo::find(&mut self.tx, task_id)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn lock_task(&mut self, task_id: DbId) -> StoreResult<Option<TaskRecord>> {
        task_opt(
            TaskRepo::lock(&mut self.tx, task_id)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn insert_task(&mut self, task: &NewTask) -> StoreResult<TaskRecord> {
        TaskRepo::insert(&mut self.tx, task)
            .await
            .map_err(StoreError::backend)?
            .try_into()
    }

    async fn transition_task(
        &mut self,
        task_id: DbId,
        from: &[TaskStatus],
        change: &TaskChange,
    ) -> StoreResult<Option<TaskRecord>> {
        task_opt(
            TaskRepo::transition(&mut self.tx, task_id, from, change)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn delete_tasks(&mut self, task_ids: &[DbId]) -> StoreResult<u64> {
        TaskRepo::delete_many(&mut self.tx, task_ids)
            .await
            .map_err(StoreError::backend)
    }

    async fn mark_tasks_recycled(&mut self, task_ids: &[DbId], at: Timestamp) -> StoreResult<u64> {
        TaskRepo::mark_recycled(&mut self.tx, task_ids, at)
            .await
            .map_err(StoreError::backend)
    }

    async fn set_task_founder(
        &mut self,
        task_id: DbId,
        service_id: DbId,
        founder: &str,
    ) -> StoreResult<()> {
        TaskRepo::set_founder(&mut self.tx, task_id, service_id, founder)
            .await
            .map_err(StoreError::backend)
    }

    async fn lock_unaccepted_student_tasks(
        &mut self,
        student_id: DbId,
    ) -> StoreResult<Vec<TaskRecord>> {
        into_records(
            TaskRepo::lock_unaccepted_for_student(&mut self.tx, student_id)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn claimed_student_value(&mut self, student_id: DbId) -> StoreResult<Money> {
        TaskRepo::student_value_in(&mut self.tx, student_id, &CLAIMED)
            .await
            .map_err(StoreError::backend)
    }

    async fn open_student_value(&mut self, student_id: DbId) -> StoreResult<Money> {
        TaskRepo::student_value_in(&mut self.tx, student_id, &UNSETTLED)
            .await
            .map_err(StoreError::backend)
    }

    async fn students_with_expired_tasks(&mut self, now: Timestamp) -> StoreResult<Vec<DbId>> {
        TaskRepo::students_with_expired(&mut self.tx, now)
            .await
            .map_err(StoreError::backend)
    }

    async fn lock_expired_student_tasks(
        &mut self,
        student_id: DbId,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>> {
        into_records(
            TaskRepo::lock_expired_for_student(&mut self.tx, student_id, now)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn lock_stale_student_tasks(
        &mut self,
        created_before: Timestamp,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>> {
        into_records(
            TaskRepo::lock_stale_unaccepted(&mut self.tx, created_before, now)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn bonus_dates_with_expired_tasks(
        &mut self,
        now: Timestamp,
    ) -> StoreResult<Vec<NaiveDate>> {
        TaskRepo::bonus_dates_with_expired(&mut self.tx, now)
            .await
            .map_err(StoreError::backend)
    }

    async fn lock_expired_bonus_tasks(
        &mut self,
        pool_date: NaiveDate,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>> {
        into_records(
            TaskRepo::lock_expired_bonus(&mut self.tx, pool_date, now)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn lock_open_bonus_tasks(
        &mut self,
        pool_date: NaiveDate,
    ) -> StoreResult<Vec<TaskRecord>> {
        into_records(
            TaskRepo::open_bonus(&mut self.tx, pool_date, true)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn open_bonus_tasks(&mut self, pool_date: NaiveDate) -> StoreResult<Vec<TaskRecord>> {
        into_records(
            TaskRepo::open_bonus(&mut self.tx, pool_date, false)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn submitted_tasks_due(
        &mut self,
        submitted_before: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<DbId>> {
        TaskRepo::submitted_before(&mut self.tx, submitted_before, limit)
            .await
            .map_err(StoreError::backend)
    }

    async fn unaccepted_tasks_by_founder(
        &mut self,
        service_id: DbId,
    ) -> StoreResult<Vec<TaskRecord>> {
        into_records(
            TaskRepo::lock_unaccepted_by_founder(&mut self.tx, service_id)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn student_tasks(&mut self, student_id: DbId) -> StoreResult<Vec<TaskRecord>> {
        into_records(
            TaskRepo::open_for_student(&mut self.tx, student_id)
                .await
                .map_err(StoreError::backend)?,
        )
    }

    async fn settled_income_between(
        &mut self,
        student_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Money> {
        TaskRepo::settled_income_between(&mut self.tx, student_id, from, to)
            .await
            .map_err(StoreError::backend)
    }

    async fn bonus_task_counts(&mut self, pool_date: NaiveDate) -> StoreResult<TaskStatusCounts> {
        let rows = TaskRepo::bonus_status_counts(&mut self.tx, pool_date)
            .await
            .map_err(StoreError::backend)?;
        let mut counts = TaskStatusCounts::default();
        for row in rows {
            let status = TaskStatus::from_code(&row.status).ok_or_else(|| {
                StoreError::Corrupt(format!("tasks: unknown status '{}'", row.status))
            })?;
            counts.add(status, row.count);
        }
        Ok(counts)
    }

    // -- Images --

    async fn reserve_image(&mut self, category: Option<&str>) -> StoreResult<Option<ImageRef>> {
        if let Some(code) = category {
            let matched = ImageRepo::claim_available(&mut self.tx, Some(code))
                .await
                .map_err(StoreError::backend)?;
            if let Some(row) = matched {
                return Ok(Some(row.into()));
            }
            tracing::debug!(category = code, "No image left in category, using any category");
        }
        Ok(ImageRepo::claim_available(&mut self.tx, None)
            .await
            .map_err(StoreError::backend)?
            .map(ImageRef::from))
    }

    async fn attach_image(&mut self, image_id: DbId, task_id: DbId) -> StoreResult<()> {
        ImageRepo::attach(&mut self.tx, image_id, task_id)
            .await
            .map_err(StoreError::backend)
    }

    async fn release_task_images(&mut self, task_ids: &[DbId]) -> StoreResult<u64> {
        ImageRepo::release_for_tasks(&mut self.tx, task_ids)
            .await
            .map_err(StoreError::backend)
    }

    async fn active_categories(&mut self) -> StoreResult<Vec<CategoryWeight>> {
        Ok(ImageRepo::active_categories(&mut self.tx)
            .await
            .map_err(StoreError::backend)?
            .into_iter()
            .map(CategoryWeight::from)
            .collect())
    }

    // -- Virtual services --

    async fn service_loads(&mut self) -> StoreResult<Vec<ServiceLoad>> {
        Ok(VirtualServiceRepo::loads(&mut self.tx)
            .await
            .map_err(StoreError::backend)?
            .into_iter()
            .map(ServiceLoad::from)
            .collect())
    }

    async fn list_services(&mut self) -> StoreResult<Vec<VirtualService>> {
        VirtualServiceRepo::list(&mut self.tx)
            .await
            .map_err(StoreError::backend)?
            .into_iter()
            .map(VirtualService::try_from)
            .collect()
    }

    async fn find_service(&mut self, service_id: DbId) -> StoreResult<Option<VirtualService>> {
        VirtualServiceRepo::find(&mut self.tx, service_id)
            .await
            .map_err(StoreError::backend)?
            .map(VirtualService::try_from)
            .transpose()
    }

    async fn insert_service(&mut self, new: &NewVirtualService) -> StoreResult<VirtualService> {
        VirtualServiceRepo::create(&mut self.tx, new)
            .await
            .map_err(StoreError::backend)?
            .try_into()
    }

    async fn update_service(
        &mut self,
        service_id: DbId,
        update: &UpdateVirtualService,
    ) -> StoreResult<Option<VirtualService>> {
        VirtualServiceRepo::update(&mut self.tx, service_id, update)
            .await
            .map_err(StoreError::backend)?
            .map(VirtualService::try_from)
            .transpose()
    }

    async fn soft_delete_service(&mut self, service_id: DbId) -> StoreResult<bool> {
        VirtualServiceRepo::soft_delete(&mut self.tx, service_id)
            .await
            .map_err(StoreError::backend)
    }

    async fn founder_totals(&mut self) -> StoreResult<Vec<FounderTotals>> {
        Ok(VirtualServiceRepo::founder_totals(&mut self.tx)
            .await
            .map_err(StoreError::backend)?
            .into_iter()
            .map(FounderTotals::from)
            .collect())
    }

    // -- Bonus pools and achievements --

    async fn find_bonus_pool(
        &mut self,
        pool_date: NaiveDate,
    ) -> StoreResult<Option<BonusPoolSnapshot>> {
        Ok(BonusRepo::find_pool(&mut self.tx, pool_date)
            .await
            .map_err(StoreError::backend)?
            .map(BonusPoolSnapshot::from))
    }

    async fn lock_bonus_pool(
        &mut self,
        pool_date: NaiveDate,
    ) -> StoreResult<Option<BonusPoolSnapshot>> {
        Ok(BonusRepo::lock_pool(&mut self.tx, pool_date)
            .await
            .map_err(StoreError::backend)?
            .map(BonusPoolSnapshot::from))
    }

    async fn insert_bonus_pool(&mut self, pool_date: NaiveDate) -> StoreResult<BonusPoolSnapshot> {
        Ok(BonusRepo::insert_pool(&mut self.tx, pool_date)
            .await
            .map_err(StoreError::backend)?
            .into())
    }

    async fn save_bonus_pool(&mut self, pool: &BonusPoolSnapshot) -> StoreResult<()> {
        BonusRepo::save_pool(&mut self.tx, pool)
            .await
            .map_err(StoreError::backend)
    }

    async fn find_achievement(
        &mut self,
        student_id: DbId,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyAchievement>> {
        Ok(BonusRepo::find_achievement(&mut self.tx, student_id, date)
            .await
            .map_err(StoreError::backend)?
            .map(DailyAchievement::from))
    }

    async fn upsert_achievement(&mut self, achievement: &DailyAchievement) -> StoreResult<()> {
        BonusRepo::upsert_achievement(&mut self.tx, achievement)
            .await
            .map_err(StoreError::backend)
    }

    async fn achievements_on(&mut self, date: NaiveDate) -> StoreResult<Vec<DailyAchievement>> {
        Ok(BonusRepo::achievements_on(&mut self.tx, date)
            .await
            .map_err(StoreError::backend)?
            .into_iter()
            .map(DailyAchievement::from)
            .collect())
    }

    // -- Reporting --

    async fn overview(&mut self) -> StoreResult<OverviewStats> {
        let pool_totals = StatsRepo::pool_totals(&mut self.tx)
            .await
            .map_err(StoreError::backend)?;
        let task_totals = StatsRepo::task_totals(&mut self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(stats::overview(pool_totals, task_totals))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(StoreError::backend)
    }
}
