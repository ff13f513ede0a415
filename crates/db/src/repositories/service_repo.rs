//! Repository for the `virtual_services` table.

use sqlx::PgConnection;
use vorder_core::allocation::{NewVirtualService, UpdateVirtualService};
use vorder_core::types::DbId;

use crate::models::service::{ServiceLoadRow, ServiceRow};
use crate::models::stats::FounderTotalsRow;

/// Column list for `virtual_services` queries.
const COLUMNS: &str = "id, user_id, name, account, status, created_at";

pub struct VirtualServiceRepo;

impl VirtualServiceRepo {
    /// Active identities with the number of open tasks each currently owns
    /// (unaccepted, accepted, in progress).
    pub async fn loads(conn: &mut PgConnection) -> Result<Vec<ServiceLoadRow>, sqlx::Error> {
        sqlx::query_as::<_, ServiceLoadRow>(
            "SELECT s.id, s.user_id, s.name, s.created_at, \
                    COUNT(t.id) AS current_task_count \
             FROM virtual_services s \
             LEFT JOIN tasks t \
                ON t.founder_id = s.id AND t.is_virtual AND t.status IN ('0', '1', '2') \
             WHERE s.status = 'active' AND NOT s.is_deleted \
             GROUP BY s.id \
             ORDER BY s.id",
        )
        .fetch_all(&mut *conn)
        .await
    }

    pub async fn list(conn: &mut PgConnection) -> Result<Vec<ServiceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM virtual_services WHERE NOT is_deleted ORDER BY id"
        );
        sqlx::query_as::<_, ServiceRow>(&query)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn find(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<ServiceRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM virtual_services WHERE id = $1 AND NOT is_deleted"
        );
        sqlx::query_as::<_, ServiceRow>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
    }

    pub async fn create(
        conn: &mut PgConnection,
        input: &NewVirtualService,
    ) -> Result<ServiceRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO virtual_services (user_id, name, account) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRow>(&query)
            .bind(input.user_id)
            .bind(&input.name)
            .bind(&input.account)
            .fetch_one(&mut *conn)
            .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: DbId,
        input: &UpdateVirtualService,
    ) -> Result<Option<ServiceRow>, sqlx::Error> {
        let query = format!(
            "UPDATE virtual_services SET \
                name = COALESCE($2, name), \
                status = COALESCE($3, status), \
                updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ServiceRow>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(input.status.map(|s| s.as_str()))
            .fetch_optional(&mut *conn)
            .await
    }

    /// Returns `true` if a live row was marked deleted.
    pub async fn soft_delete(conn: &mut PgConnection, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE virtual_services \
             SET is_deleted = TRUE, status = 'inactive', updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn founder_totals(
        conn: &mut PgConnection,
    ) -> Result<Vec<FounderTotalsRow>, sqlx::Error> {
        sqlx::query_as::<_, FounderTotalsRow>(
            "SELECT founder_id, \
                    COUNT(*) FILTER (WHERE status IN ('0', '1', '2', '3')) AS open_tasks, \
                    COALESCE(SUM(commission) FILTER (WHERE status IN ('0', '1', '2', '3')), 0) \
                        AS open_amount, \
                    COUNT(*) FILTER (WHERE status = '4') AS completed_tasks \
             FROM tasks \
             WHERE is_virtual AND founder_id IS NOT NULL \
             GROUP BY founder_id \
             ORDER BY founder_id",
        )
        .fetch_all(&mut *conn)
        .await
    }
}
