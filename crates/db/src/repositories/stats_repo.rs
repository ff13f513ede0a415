//! Aggregates for the overview endpoint.

use sqlx::PgConnection;

use crate::models::stats::{PoolTotalsRow, TaskTotalsRow};

pub struct StatsRepo;

impl StatsRepo {
    pub async fn pool_totals(conn: &mut PgConnection) -> Result<PoolTotalsRow, sqlx::Error> {
        sqlx::query_as::<_, PoolTotalsRow>(
            "SELECT COUNT(*) AS students, \
                    COALESCE(SUM(total_subsidy), 0) AS total_subsidy, \
                    COALESCE(SUM(consumed_subsidy), 0) AS consumed_subsidy, \
                    COALESCE(SUM(remaining_amount), 0) AS remaining_amount \
             FROM subsidy_pools \
             WHERE NOT is_deleted",
        )
        .fetch_one(&mut *conn)
        .await
    }

    pub async fn task_totals(conn: &mut PgConnection) -> Result<TaskTotalsRow, sqlx::Error> {
        sqlx::query_as::<_, TaskTotalsRow>(
            "SELECT COUNT(*) AS tasks_generated, \
                    COUNT(*) FILTER (WHERE status = '4') AS tasks_completed, \
                    COUNT(*) FILTER (WHERE status IN ('0', '1', '2', '3')) AS open_tasks \
             FROM tasks \
             WHERE is_virtual",
        )
        .fetch_one(&mut *conn)
        .await
    }
}
