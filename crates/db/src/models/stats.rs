use sqlx::FromRow;
use vorder_core::store::{FounderTotals, OverviewStats};
use vorder_core::types::{DbId, Money};

#[derive(Debug, Clone, FromRow)]
pub struct FounderTotalsRow {
    pub founder_id: DbId,
    pub open_tasks: i64,
    pub open_amount: Money,
    pub completed_tasks: i64,
}

impl From<FounderTotalsRow> for FounderTotals {
    fn from(row: FounderTotalsRow) -> Self {
        FounderTotals {
            service_id: row.founder_id,
            open_tasks: row.open_tasks,
            open_amount: row.open_amount,
            completed_tasks: row.completed_tasks,
        }
    }
}

/// `(status, count)` pair from a grouped task query.
#[derive(Debug, Clone, FromRow)]
pub struct StatusCountRow {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct PoolTotalsRow {
    pub students: i64,
    pub total_subsidy: Money,
    pub consumed_subsidy: Money,
    pub remaining_amount: Money,
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskTotalsRow {
    pub tasks_generated: i64,
    pub tasks_completed: i64,
    pub open_tasks: i64,
}

pub fn overview(pools: PoolTotalsRow, tasks: TaskTotalsRow) -> OverviewStats {
    OverviewStats {
        students: pools.students,
        total_subsidy: pools.total_subsidy,
        consumed_subsidy: pools.consumed_subsidy,
        remaining_amount: pools.remaining_amount,
        tasks_generated: tasks.tasks_generated,
        tasks_completed: tasks.tasks_completed,
        open_tasks: tasks.open_tasks,
    }
}
