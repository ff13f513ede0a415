use sqlx::FromRow;
use vorder_core::ledger::{PoolSnapshot, PoolStatus};
use vorder_core::store::StoreError;
use vorder_core::types::{DbId, Money, Timestamp};

/// A row from the `subsidy_pools` table.
#[derive(Debug, Clone, FromRow)]
pub struct PoolRow {
    pub id: DbId,
    pub student_id: DbId,
    pub student_name: String,
    pub total_subsidy: Money,
    pub allocated_amount: Money,
    pub remaining_amount: Money,
    pub completed_amount: Money,
    pub consumed_subsidy: Money,
    pub forfeited_amount: Money,
    pub bonus_pool_completed_amount: Money,
    pub bonus_pool_consumed_subsidy: Money,
    pub status: String,
    pub import_batch: Option<String>,
    pub last_allocation_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl TryFrom<PoolRow> for PoolSnapshot {
    type Error = StoreError;

    fn try_from(row: PoolRow) -> Result<Self, Self::Error> {
        let status: PoolStatus = row
            .status
            .parse()
            .map_err(|e: String| StoreError::Corrupt(format!("subsidy_pools {}: {e}", row.id)))?;
        Ok(PoolSnapshot {
            id: row.id,
            student_id: row.student_id,
            student_name: row.student_name,
            total_subsidy: row.total_subsidy,
            allocated_amount: row.allocated_amount,
            remaining_amount: row.remaining_amount,
            completed_amount: row.completed_amount,
            consumed_subsidy: row.consumed_subsidy,
            forfeited_amount: row.forfeited_amount,
            bonus_pool_completed_amount: row.bonus_pool_completed_amount,
            bonus_pool_consumed_subsidy: row.bonus_pool_consumed_subsidy,
            status,
            import_batch: row.import_batch,
            last_allocation_at: row.last_allocation_at,
            created_at: row.created_at,
        })
    }
}
