use chrono::NaiveDate;
use sqlx::FromRow;
use vorder_core::store::StoreError;
use vorder_core::task::{TaskRecord, TaskStatus};
use vorder_core::types::{DbId, Money, Timestamp};

/// A row from the `tasks` table.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: DbId,
    pub summary: String,
    pub requirement: String,
    pub category: Option<String>,
    pub order_number: String,
    pub commission: Money,
    pub status: String,
    pub is_virtual: bool,
    pub target_student_id: Option<DbId>,
    pub is_bonus_pool: bool,
    pub bonus_pool_date: Option<NaiveDate>,
    pub founder_id: Option<DbId>,
    pub founder: Option<String>,
    pub accepted_by: Option<String>,
    pub accepted_at: Option<Timestamp>,
    pub submitted_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub settled_income: Option<Money>,
    pub value_recycled: bool,
    pub end_date: Timestamp,
    pub delivery_date: Timestamp,
    pub created_at: Timestamp,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status = TaskStatus::from_code(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!("tasks {}: unknown status '{}'", row.id, row.status))
        })?;
        Ok(TaskRecord {
            id: row.id,
            summary: row.summary,
            requirement: row.requirement,
            category: row.category,
            order_number: row.order_number,
            commission: row.commission,
            status,
            is_virtual: row.is_virtual,
            target_student_id: row.target_student_id,
            is_bonus_pool: row.is_bonus_pool,
            bonus_pool_date: row.bonus_pool_date,
            founder_id: row.founder_id,
            founder: row.founder,
            accepted_by: row.accepted_by,
            accepted_at: row.accepted_at,
            submitted_at: row.submitted_at,
            completed_at: row.completed_at,
            settled_income: row.settled_income,
            value_recycled: row.value_recycled,
            end_date: row.end_date,
            delivery_date: row.delivery_date,
            created_at: row.created_at,
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt one.
pub fn into_records(rows: Vec<TaskRow>) -> Result<Vec<TaskRecord>, StoreError> {
    rows.into_iter().map(TaskRecord::try_from).collect()
}
