#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use vorder_core::clock::ManualClock;
use vorder_core::money::money;
use vorder_core::task::TaskRecord;
use vorder_core::types::{DbId, Timestamp};
use vorder_engine::ledger::SubsidyImportRow;
use vorder_engine::memory::MemoryStore;
use vorder_engine::{EngineConfig, VirtualOrderEngine};

pub struct Harness {
    pub engine: Arc<VirtualOrderEngine>,
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
}

/// 2026-03-02 04:00 UTC, outside the daily window.
pub fn start() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap()
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

pub fn row(student_id: DbId, amount: i64) -> SubsidyImportRow {
    SubsidyImportRow {
        student_id,
        student_name: format!("Student {student_id}"),
        amount: money(amount),
    }
}

pub async fn harness() -> Harness {
    harness_with(3, 500).await
}

/// Engine on a fresh in-memory store with `services` established identities
/// and `images` available images.
pub async fn harness_with(services: usize, images: usize) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let store = MemoryStore::new(clock.clone());
    for i in 0..services {
        store
            .add_service(&format!("Service {i}"), start() - Duration::days(30))
            .await;
    }
    store.add_category("data_entry", 3).await;
    store.add_images(Some("data_entry"), images).await;

    let config = EngineConfig {
        splitter_seed: Some(42),
        ..EngineConfig::default()
    };
    let shared = Arc::new(store.clone());
    let engine = VirtualOrderEngine::new(shared.clone(), shared, clock.clone(), config);
    Harness {
        engine: Arc::new(engine),
        store,
        clock,
    }
}

impl Harness {
    pub async fn student_tasks(&self, student_id: DbId) -> Vec<TaskRecord> {
        self.store
            .tasks()
            .await
            .into_iter()
            .filter(|t| !t.is_bonus_pool && t.target_student_id == Some(student_id))
            .collect()
    }

    pub async fn bonus_tasks(&self, date: NaiveDate) -> Vec<TaskRecord> {
        self.store
            .tasks()
            .await
            .into_iter()
            .filter(|t| t.bonus_pool_date == Some(date))
            .collect()
    }

    /// Accept, submit and complete the student's first open task.
    pub async fn work_first_task(&self, student_id: DbId) -> TaskRecord {
        let task = self
            .student_tasks(student_id)
            .await
            .into_iter()
            .find(|t| t.status == vorder_core::task::TaskStatus::Unaccepted)
            .expect("an open task");
        self.engine.accept_task(task.id, student_id).await.unwrap();
        self.engine.submit_task(task.id, student_id).await.unwrap();
        self.engine.complete_task(task.id).await.unwrap();
        task
    }

    /// `consumed + open + forfeited + remaining - total` for the student.
    pub async fn settlement_gap(&self, student_id: DbId) -> rust_decimal::Decimal {
        let pool = self.store.pool(student_id).await.expect("pool");
        pool.settlement_gap(self.store.open_value(student_id).await)
    }
}
