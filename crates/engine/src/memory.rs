//! In-memory [`Store`] for tests and local runs.
//!
//! A transaction takes the whole state lock and works on a copy that is
//! written back on commit, so dropping it rolls back. Holding two
//! transactions from the same task deadlocks. The constraints the
//! PostgreSQL schema enforces that the engine relies on are reproduced.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use vorder_core::allocation::{
    NewVirtualService, ServiceLoad, ServiceStatus, UpdateVirtualService, VirtualService,
};
use vorder_core::bonus::{BonusPoolSnapshot, DailyAchievement};
use vorder_core::clock::Clock;
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

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("duplicate key value violates unique constraint \"{0}\"")]
    UniqueViolation(&'static str),

    #[error("update or delete violates foreign key constraint \"{0}\"")]
    ForeignKeyViolation(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageStatus {
    Available,
    Used,
}

#[derive(Debug, Clone)]
struct StoredImage {
    id: DbId,
    category: Option<String>,
    file_url: String,
    status: ImageStatus,
    used_in_task_id: Option<DbId>,
}

#[derive(Debug, Clone)]
struct StoredService {
    service: VirtualService,
    deleted: bool,
}

#[derive(Debug, Clone, Default)]
struct State {
    next_id: DbId,
    settings: RuntimeSettings,
    pools: BTreeMap<DbId, PoolSnapshot>,
    tasks: BTreeMap<DbId, TaskRecord>,
    images: BTreeMap<DbId, StoredImage>,
    categories: Vec<CategoryWeight>,
    services: BTreeMap<DbId, StoredService>,
    bonus_pools: BTreeMap<NaiveDate, BonusPoolSnapshot>,
    achievements: BTreeMap<(NaiveDate, DbId), DailyAchievement>,
    agent_rebates: HashMap<DbId, String>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn active_pool(&self, student_id: DbId) -> Option<&PoolSnapshot> {
        self.pools
            .values()
            .find(|p| p.student_id == student_id && p.status == PoolStatus::Active)
    }

    fn active_pools(&self) -> Vec<PoolSnapshot> {
        let mut pools: Vec<PoolSnapshot> = self
            .pools
            .values()
            .filter(|p| p.status == PoolStatus::Active)
            .cloned()
            .collect();
        pools.sort_by_key(|p| p.student_id);
        pools
    }

    fn virtual_tasks(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values().filter(|t| t.is_virtual)
    }

    fn personal_tasks(&self, student_id: DbId) -> impl Iterator<Item = &TaskRecord> {
        self.virtual_tasks()
            .filter(move |t| !t.is_bonus_pool && t.target_student_id == Some(student_id))
    }

    /// Personal tasks targeting the student plus bonus tasks they accepted.
    fn visible_to(&self, student_id: DbId) -> impl Iterator<Item = &TaskRecord> {
        let acceptor = student_id.to_string();
        self.virtual_tasks().filter(move |t| {
            if t.is_bonus_pool {
                t.accepted_by.as_deref() == Some(acceptor.as_str())
            } else {
                t.target_student_id == Some(student_id)
            }
        })
    }

    fn student_value(&self, student_id: DbId, statuses: &[TaskStatus]) -> Money {
        self.personal_tasks(student_id)
            .filter(|t| statuses.contains(&t.status))
            .map(|t| t.commission)
            .sum()
    }
}

fn backend(err: MemoryStoreError) -> StoreError {
    StoreError::backend(err)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Shared in-memory state. Clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    // -- Seeding --

    pub async fn add_service(&self, name: &str, created_at: Timestamp) -> DbId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.services.insert(
            id,
            StoredService {
                service: VirtualService {
                    id,
                    user_id: 1000 + id,
                    name: name.to_string(),
                    account: format!("svc-{id}"),
                    status: ServiceStatus::Active,
                    created_at,
                },
                deleted: false,
            },
        );
        id
    }

    pub async fn add_category(&self, code: &str, weight: u32) {
        self.state.lock().await.categories.push(CategoryWeight {
            code: code.to_string(),
            weight,
        });
    }

    pub async fn add_images(&self, category: Option<&str>, count: usize) -> Vec<DbId> {
        let mut state = self.state.lock().await;
        (0..count)
            .map(|_| {
                let id = state.next_id();
                state.images.insert(
                    id,
                    StoredImage {
                        id,
                        category: category.map(str::to_string),
                        file_url: format!("https://img.example.com/{id}.png"),
                        status: ImageStatus::Available,
                        used_in_task_id: None,
                    },
                );
                id
            })
            .collect()
    }

    /// Raw `agent_rebate` text of the student's agent.
    pub async fn set_rebate(&self, student_id: DbId, raw: &str) {
        self.state
            .lock()
            .await
            .agent_rebates
            .insert(student_id, raw.to_string());
    }

    pub async fn set_settings(&self, settings: RuntimeSettings) {
        self.state.lock().await.settings = settings;
    }

    pub async fn put_achievement(&self, achievement: DailyAchievement) {
        self.state.lock().await.achievements.insert(
            (achievement.achievement_date, achievement.student_id),
            achievement,
        );
    }

    /// Edit a stored task in place, e.g. to age it.
    pub async fn update_task(&self, task_id: DbId, f: impl FnOnce(&mut TaskRecord)) {
        if let Some(task) = self.state.lock().await.tasks.get_mut(&task_id) {
            f(task);
        }
    }

    // -- Inspection --

    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.state.lock().await.tasks.values().cloned().collect()
    }

    pub async fn task(&self, task_id: DbId) -> Option<TaskRecord> {
        self.state.lock().await.tasks.get(&task_id).cloned()
    }

    pub async fn pool(&self, student_id: DbId) -> Option<PoolSnapshot> {
        self.state.lock().await.active_pool(student_id).cloned()
    }

    pub async fn bonus_pool(&self, date: NaiveDate) -> Option<BonusPoolSnapshot> {
        self.state.lock().await.bonus_pools.get(&date).cloned()
    }

    pub async fn available_images(&self) -> usize {
        self.state
            .lock()
            .await
            .images
            .values()
            .filter(|i| i.status == ImageStatus::Available)
            .count()
    }

    /// Face value of the student's unsettled personal tasks.
    pub async fn open_value(&self, student_id: DbId) -> Money {
        self.state.lock().await.student_value(
            student_id,
            &[
                TaskStatus::Unaccepted,
                TaskStatus::Accepted,
                TaskStatus::InProgress,
                TaskStatus::Submitted,
            ],
        )
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            work,
            now: self.clock.now(),
        }))
    }
}

#[async_trait]
impl RebateSource for MemoryStore {
    async fn rebate_rate(&self, student_id: DbId) -> StoreResult<Option<Money>> {
        let state = self.state.lock().await;
        Ok(state
            .agent_rebates
            .get(&student_id)
            .and_then(|raw| parse_rebate_rate(raw)))
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
    now: Timestamp,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn load_settings(&mut self) -> StoreResult<RuntimeSettings> {
        Ok(self.work.settings.clone())
    }

    async fn save_settings(&mut self, settings: &RuntimeSettings) -> StoreResult<()> {
        self.work.settings = settings.clone();
        Ok(())
    }

    // -- Subsidy pools --

    async fn find_pool(&mut self, student_id: DbId) -> StoreResult<Option<PoolSnapshot>> {
        Ok(self.work.active_pool(student_id).cloned())
    }

    async fn lock_pool(&mut self, student_id: DbId) -> StoreResult<Option<PoolSnapshot>> {
        Ok(self.work.active_pool(student_id).cloned())
    }

    async fn insert_pool(&mut self, pool: &NewPool) -> StoreResult<PoolSnapshot> {
        if self.work.active_pool(pool.student_id).is_some() {
            return Err(backend(MemoryStoreError::UniqueViolation(
                "uq_subsidy_pools_student",
            )));
        }
        let id = self.work.next_id();
        let snapshot = PoolSnapshot::opened(id, pool, self.now);
        self.work.pools.insert(id, snapshot.clone());
        Ok(snapshot)
    }

    async fn save_pool(&mut self, pool: &PoolSnapshot) -> StoreResult<()> {
        self.work.pools.insert(pool.id, pool.clone());
        Ok(())
    }

    async fn delete_pool(&mut self, pool_id: DbId) -> StoreResult<()> {
        self.work.pools.remove(&pool_id);
        Ok(())
    }

    async fn soft_delete_pool(&mut self, pool_id: DbId, _at: Timestamp) -> StoreResult<()> {
        if let Some(pool) = self.work.pools.get_mut(&pool_id) {
            pool.status = PoolStatus::Deleted;
        }
        Ok(())
    }

    async fn list_pools(
        &mut self,
        status: Option<PoolStatus>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<PoolSnapshot>> {
        let mut pools: Vec<PoolSnapshot> = self
            .work
            .pools
            .values()
            .filter(|p| status.map_or(true, |s| s == p.status))
            .cloned()
            .collect();
        pools.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(pools
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_active_pools(&mut self) -> StoreResult<Vec<PoolSnapshot>> {
        Ok(self.work.active_pools())
    }

    async fn lock_active_pools(
        &mut self,
        created_before: Timestamp,
    ) -> StoreResult<Vec<PoolSnapshot>> {
        Ok(self
            .work
            .active_pools()
            .into_iter()
            .filter(|p| p.created_at < created_before)
            .collect())
    }

    // -- Tasks --

    async fn find_task(&mut self, task_id: DbId) -> StoreResult<Option<TaskRecord>> {
        Ok(self.work.tasks.get(&task_id).cloned())
    }

    async fn lock_task(&mut self, task_id: DbId) -> StoreResult<Option<TaskRecord>> {
        Ok(self.work.tasks.get(&task_id).cloned())
    }

    async fn insert_task(&mut self, task: &NewTask) -> StoreResult<TaskRecord> {
        let id = self.work.next_id();
        let record = TaskRecord {
            id,
            summary: task.summary.clone(),
            requirement: task.requirement.clone(),
            category: task.category.clone(),
            order_number: task.order_number.clone(),
            commission: task.commission,
            status: TaskStatus::Unaccepted,
            is_virtual: true,
            target_student_id: task.target_student_id,
            is_bonus_pool: task.is_bonus_pool,
            bonus_pool_date: task.bonus_pool_date,
            founder_id: Some(task.founder_id),
            founder: Some(task.founder.clone()),
            accepted_by: None,
            accepted_at: None,
            submitted_at: None,
            completed_at: None,
            settled_income: None,
            value_recycled: false,
            end_date: task.end_date,
            delivery_date: task.delivery_date,
            created_at: self.now,
        };
        self.work.tasks.insert(id, record.clone());
        Ok(record)
    }

    async fn transition_task(
        &mut self,
        task_id: DbId,
        from: &[TaskStatus],
        change: &TaskChange,
    ) -> StoreResult<Option<TaskRecord>> {
        match self.work.tasks.get_mut(&task_id) {
            Some(task) if from.contains(&task.status) => {
                change.apply(task);
                Ok(Some(task.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_tasks(&mut self, task_ids: &[DbId]) -> StoreResult<u64> {
        if self
            .work
            .images
            .values()
            .any(|i| i.used_in_task_id.is_some_and(|t| task_ids.contains(&t)))
        {
            return Err(backend(MemoryStoreError::ForeignKeyViolation(
                "resource_images_used_in_task_id_fkey",
            )));
        }
        let mut deleted = 0;
        for id in task_ids {
            if self.work.tasks.remove(id).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn mark_tasks_recycled(&mut self, task_ids: &[DbId], _at: Timestamp) -> StoreResult<u64> {
        let mut marked = 0;
        for id in task_ids {
            if let Some(task) = self.work.tasks.get_mut(id) {
                if !task.value_recycled {
                    task.value_recycled = true;
                    marked += 1;
                }
            }
        }
        Ok(marked)
    }

    async fn set_task_founder(
        &mut self,
        task_id: DbId,
        service_id: DbId,
        founder: &str,
    ) -> StoreResult<()> {
        if let Some(task) = self.work.tasks.get_mut(&task_id) {
            task.founder_id = Some(service_id);
            task.founder = Some(founder.to_string());
        }
        Ok(())
    }

    async fn lock_unaccepted_student_tasks(
        &mut self,
        student_id: DbId,
    ) -> StoreResult<Vec<TaskRecord>> {
        Ok(self
            .work
            .personal_tasks(student_id)
            .filter(|t| t.status == TaskStatus::Unaccepted)
            .cloned()
            .collect())
    }

    async fn claimed_student_value(&mut self, student_id: DbId) -> StoreResult<Money> {
        Ok(self.work.student_value(
            student_id,
            &[TaskStatus::Accepted, TaskStatus::InProgress, TaskStatus::Submitted],
        ))
    }

    async fn open_student_value(&mut self, student_id: DbId) -> StoreResult<Money> {
        Ok(self.work.student_value(
            student_id,
            &[
                TaskStatus::Unaccepted,
                TaskStatus::Accepted,
                TaskStatus::InProgress,
                TaskStatus::Submitted,
            ],
        ))
    }

    async fn students_with_expired_tasks(&mut self, now: Timestamp) -> StoreResult<Vec<DbId>> {
        let mut students: Vec<DbId> = self
            .work
            .virtual_tasks()
            .filter(|t| !t.is_bonus_pool && is_expired_personal(t, now))
            .filter_map(|t| t.target_student_id)
            .collect();
        students.sort_unstable();
        students.dedup();
        Ok(students)
    }

    async fn lock_expired_student_tasks(
        &mut self,
        student_id: DbId,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>> {
        Ok(self
            .work
            .personal_tasks(student_id)
            .filter(|t| is_expired_personal(t, now))
            .cloned()
            .collect())
    }

    async fn lock_stale_student_tasks(
        &mut self,
        created_before: Timestamp,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>> {
        Ok(self
            .work
            .virtual_tasks()
            .filter(|t| {
                !t.is_bonus_pool
                    && t.status == TaskStatus::Unaccepted
                    && t.end_date <= now
                    && t.created_at < created_before
            })
            .cloned()
            .collect())
    }

    async fn bonus_dates_with_expired_tasks(
        &mut self,
        now: Timestamp,
    ) -> StoreResult<Vec<NaiveDate>> {
        let mut dates: Vec<NaiveDate> = self
            .work
            .virtual_tasks()
            .filter(|t| t.is_bonus_pool && t.status == TaskStatus::Unaccepted && t.end_date <= now)
            .filter_map(|t| t.bonus_pool_date)
            .collect();
        dates.sort_unstable();
        dates.dedup();
        Ok(dates)
    }

    async fn lock_expired_bonus_tasks(
        &mut self,
        pool_date: NaiveDate,
        now: Timestamp,
    ) -> StoreResult<Vec<TaskRecord>> {
        Ok(self
            .work
            .virtual_tasks()
            .filter(|t| {
                t.is_bonus_pool
                    && t.bonus_pool_date == Some(pool_date)
                    && t.status == TaskStatus::Unaccepted
                    && t.end_date <= now
            })
            .cloned()
            .collect())
    }

    async fn lock_open_bonus_tasks(
        &mut self,
        pool_date: NaiveDate,
    ) -> StoreResult<Vec<TaskRecord>> {
        self.open_bonus_tasks(pool_date).await
    }

    async fn open_bonus_tasks(&mut self, pool_date: NaiveDate) -> StoreResult<Vec<TaskRecord>> {
        Ok(self
            .work
            .virtual_tasks()
            .filter(|t| {
                t.is_bonus_pool
                    && t.bonus_pool_date == Some(pool_date)
                    && t.status == TaskStatus::Unaccepted
            })
            .cloned()
            .collect())
    }

    async fn submitted_tasks_due(
        &mut self,
        submitted_before: Timestamp,
        limit: i64,
    ) -> StoreResult<Vec<DbId>> {
        let mut due: Vec<(Timestamp, DbId)> = self
            .work
            .virtual_tasks()
            .filter(|t| t.status == TaskStatus::Submitted)
            .filter_map(|t| t.submitted_at.map(|at| (at, t.id)))
            .filter(|(at, _)| *at <= submitted_before)
            .collect();
        due.sort_unstable();
        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }

    async fn unaccepted_tasks_by_founder(
        &mut self,
        service_id: DbId,
    ) -> StoreResult<Vec<TaskRecord>> {
        Ok(self
            .work
            .virtual_tasks()
            .filter(|t| t.founder_id == Some(service_id) && t.status == TaskStatus::Unaccepted)
            .cloned()
            .collect())
    }

    async fn student_tasks(&mut self, student_id: DbId) -> StoreResult<Vec<TaskRecord>> {
        Ok(self
            .work
            .visible_to(student_id)
            .filter(|t| !t.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn settled_income_between(
        &mut self,
        student_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Money> {
        Ok(self
            .work
            .personal_tasks(student_id)
            .filter(|t| t.status == TaskStatus::Completed)
            .filter(|t| t.completed_at.is_some_and(|at| at >= from && at < to))
            .map(|t| t.settled_income.unwrap_or(Decimal::ZERO))
            .sum())
    }

    async fn bonus_task_counts(&mut self, pool_date: NaiveDate) -> StoreResult<TaskStatusCounts> {
        let mut counts = TaskStatusCounts::default();
        for task in self
            .work
            .tasks
            .values()
            .filter(|t| t.is_bonus_pool && t.bonus_pool_date == Some(pool_date))
        {
            counts.add(task.status, 1);
        }
        Ok(counts)
    }

    // -- Images --

    async fn reserve_image(&mut self, category: Option<&str>) -> StoreResult<Option<ImageRef>> {
        let available = |i: &&StoredImage| i.status == ImageStatus::Available;
        let id = category
            .and_then(|code| {
                self.work
                    .images
                    .values()
                    .filter(available)
                    .find(|i| i.category.as_deref() == Some(code))
            })
            .or_else(|| self.work.images.values().find(available))
            .map(|i| i.id);

        let Some(image) = id.and_then(|id| self.work.images.get_mut(&id)) else {
            return Ok(None);
        };
        image.status = ImageStatus::Used;
        Ok(Some(ImageRef {
            id: image.id,
            category: image.category.clone(),
            file_url: image.file_url.clone(),
        }))
    }

    async fn attach_image(&mut self, image_id: DbId, task_id: DbId) -> StoreResult<()> {
        if let Some(image) = self.work.images.get_mut(&image_id) {
            image.used_in_task_id = Some(task_id);
        }
        Ok(())
    }

    async fn release_task_images(&mut self, task_ids: &[DbId]) -> StoreResult<u64> {
        let mut released = 0;
        for image in self.work.images.values_mut() {
            if image.used_in_task_id.is_some_and(|t| task_ids.contains(&t)) {
                image.used_in_task_id = None;
                image.status = ImageStatus::Available;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn active_categories(&mut self) -> StoreResult<Vec<CategoryWeight>> {
        Ok(self.work.categories.clone())
    }

    // -- Virtual services --

    async fn service_loads(&mut self) -> StoreResult<Vec<ServiceLoad>> {
        let loads = self
            .work
            .services
            .values()
            .filter(|s| !s.deleted && s.service.status == ServiceStatus::Active)
            .map(|s| ServiceLoad {
                service_id: s.service.id,
                user_id: s.service.user_id,
                name: s.service.name.clone(),
                created_at: s.service.created_at,
                current_task_count: self
                    .work
                    .virtual_tasks()
                    .filter(|t| t.founder_id == Some(s.service.id) && t.status.counts_toward_load())
                    .count() as i64,
            })
            .collect();
        Ok(loads)
    }

    async fn list_services(&mut self) -> StoreResult<Vec<VirtualService>> {
        Ok(self
            .work
            .services
            .values()
            .filter(|s| !s.deleted)
            .map(|s| s.service.clone())
            .collect())
    }

    async fn find_service(&mut self, service_id: DbId) -> StoreResult<Option<VirtualService>> {
        Ok(self
            .work
            .services
            .get(&service_id)
            .filter(|s| !s.deleted)
            .map(|s| s.service.clone()))
    }

    async fn insert_service(&mut self, new: &NewVirtualService) -> StoreResult<VirtualService> {
        if self.work.services.values().any(|s| s.service.account == new.account) {
            return Err(backend(MemoryStoreError::UniqueViolation(
                "uq_virtual_services_account",
            )));
        }
        let id = self.work.next_id();
        let service = VirtualService {
            id,
            user_id: new.user_id,
            name: new.name.clone(),
            account: new.account.clone(),
            status: ServiceStatus::Active,
            created_at: self.now,
        };
        self.work.services.insert(
            id,
            StoredService {
                service: service.clone(),
                deleted: false,
            },
        );
        Ok(service)
    }

    async fn update_service(
        &mut self,
        service_id: DbId,
        update: &UpdateVirtualService,
    ) -> StoreResult<Option<VirtualService>> {
        let Some(stored) = self
            .work
            .services
            .get_mut(&service_id)
            .filter(|s| !s.deleted)
        else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            stored.service.name = name.clone();
        }
        if let Some(status) = update.status {
            stored.service.status = status;
        }
        Ok(Some(stored.service.clone()))
    }

    async fn soft_delete_service(&mut self, service_id: DbId) -> StoreResult<bool> {
        match self.work.services.get_mut(&service_id) {
            Some(stored) if !stored.deleted => {
                stored.deleted = true;
                stored.service.status = ServiceStatus::Inactive;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn founder_totals(&mut self) -> StoreResult<Vec<FounderTotals>> {
        let mut totals: BTreeMap<DbId, FounderTotals> = BTreeMap::new();
        for task in self.work.virtual_tasks() {
            let Some(service_id) = task.founder_id else {
                continue;
            };
            let entry = totals.entry(service_id).or_insert_with(|| FounderTotals {
                service_id,
                open_tasks: 0,
                open_amount: Decimal::ZERO,
                completed_tasks: 0,
            });
            if !task.status.is_terminal() {
                entry.open_tasks += 1;
                entry.open_amount += task.commission;
            } else if task.status == TaskStatus::Completed {
                entry.completed_tasks += 1;
            }
        }
        Ok(totals.into_values().collect())
    }

    // -- Bonus pools and achievements --

    async fn find_bonus_pool(
        &mut self,
        pool_date: NaiveDate,
    ) -> StoreResult<Option<BonusPoolSnapshot>> {
        Ok(self.work.bonus_pools.get(&pool_date).cloned())
    }

    async fn lock_bonus_pool(
        &mut self,
        pool_date: NaiveDate,
    ) -> StoreResult<Option<BonusPoolSnapshot>> {
        Ok(self.work.bonus_pools.get(&pool_date).cloned())
    }

    async fn insert_bonus_pool(&mut self, pool_date: NaiveDate) -> StoreResult<BonusPoolSnapshot> {
        if let Some(existing) = self.work.bonus_pools.get(&pool_date) {
            return Ok(existing.clone());
        }
        let id = self.work.next_id();
        let pool = BonusPoolSnapshot::empty(id, pool_date, self.now);
        self.work.bonus_pools.insert(pool_date, pool.clone());
        Ok(pool)
    }

    async fn save_bonus_pool(&mut self, pool: &BonusPoolSnapshot) -> StoreResult<()> {
        self.work.bonus_pools.insert(pool.pool_date, pool.clone());
        Ok(())
    }

    async fn find_achievement(
        &mut self,
        student_id: DbId,
        date: NaiveDate,
    ) -> StoreResult<Option<DailyAchievement>> {
        Ok(self.work.achievements.get(&(date, student_id)).cloned())
    }

    async fn upsert_achievement(&mut self, achievement: &DailyAchievement) -> StoreResult<()> {
        self.work.achievements.insert(
            (achievement.achievement_date, achievement.student_id),
            achievement.clone(),
        );
        Ok(())
    }

    async fn achievements_on(&mut self, date: NaiveDate) -> StoreResult<Vec<DailyAchievement>> {
        Ok(self
            .work
            .achievements
            .range((date, DbId::MIN)..=(date, DbId::MAX))
            .map(|(_, a)| a.clone())
            .collect())
    }

    // -- Reporting --

    async fn overview(&mut self) -> StoreResult<OverviewStats> {
        let pools = self.work.active_pools();
        let mut stats = OverviewStats {
            students: pools.len() as i64,
            ..OverviewStats::default()
        };
        for pool in &pools {
            stats.total_subsidy += pool.total_subsidy;
            stats.consumed_subsidy += pool.consumed_subsidy;
            stats.remaining_amount += pool.remaining_amount;
        }
        for task in self.work.virtual_tasks() {
            stats.tasks_generated += 1;
            if task.status == TaskStatus::Completed {
                stats.tasks_completed += 1;
            } else if !task.status.is_terminal() {
                stats.open_tasks += 1;
            }
        }
        Ok(stats)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, work, .. } = *self;
        *guard = work;
        Ok(())
    }
}

fn is_expired_personal(task: &TaskRecord, now: Timestamp) -> bool {
    match task.status {
        TaskStatus::Unaccepted => task.end_date <= now,
        TaskStatus::Terminated => !task.value_recycled,
        _ => false,
    }
}
