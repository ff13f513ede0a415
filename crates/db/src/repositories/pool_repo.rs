//! Repository for the `subsidy_pools` table.

use sqlx::PgConnection;
use vorder_core::ledger::{NewPool, PoolSnapshot};
use vorder_core::types::{DbId, Timestamp};

use crate::models::pool::PoolRow;

/// Column list for `subsidy_pools` queries.
const COLUMNS: &str = "\
    id, student_id, student_name, total_subsidy, allocated_amount, remaining_amount, \
    completed_amount, consumed_subsidy, forfeited_amount, \
    bonus_pool_completed_amount, bonus_pool_consumed_subsidy, \
    status, import_batch, last_allocation_at, created_at";

pub struct SubsidyPoolRepo;

impl SubsidyPoolRepo {
    pub async fn find_active(
        conn: &mut PgConnection,
        student_id: DbId,
    ) -> Result<Option<PoolRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subsidy_pools WHERE student_id = $1 AND NOT is_deleted"
        );
        sqlx::query_as::<_, PoolRow>(&query)
            .bind(student_id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Same as [`find_active`](Self::find_active) but takes a row lock.
    pub async fn lock_active(
        conn: &mut PgConnection,
        student_id: DbId,
    ) -> Result<Option<PoolRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subsidy_pools \
             WHERE student_id = $1 AND NOT is_deleted \
             FOR UPDATE"
        );
        sqlx::query_as::<_, PoolRow>(&query)
            .bind(student_id)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Open a pool with the whole subsidy unallocated.
    pub async fn insert(conn: &mut PgConnection, new: &NewPool) -> Result<PoolRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO subsidy_pools \
                (student_id, student_name, total_subsidy, allocated_amount, \
                 remaining_amount, import_batch) \
             VALUES ($1, $2, $3, 0, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PoolRow>(&query)
            .bind(new.student_id)
            .bind(&new.student_name)
            .bind(new.total_subsidy)
            .bind(&new.import_batch)
            .fetch_one(&mut *conn)
            .await
    }

    /// Write every mutable ledger column back.
    pub async fn save(conn: &mut PgConnection, pool: &PoolSnapshot) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE subsidy_pools SET \
                student_name = $2, total_subsidy = $3, allocated_amount = $4, \
                remaining_amount = $5, completed_amount = $6, consumed_subsidy = $7, \
                forfeited_amount = $8, bonus_pool_completed_amount = $9, \
                bonus_pool_consumed_subsidy = $10, status = $11, import_batch = $12, \
                last_allocation_at = $13, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(pool.id)
        .bind(&pool.student_name)
        .bind(pool.total_subsidy)
        .bind(pool.allocated_amount)
        .bind(pool.remaining_amount)
        .bind(pool.completed_amount)
        .bind(pool.consumed_subsidy)
        .bind(pool.forfeited_amount)
        .bind(pool.bonus_pool_completed_amount)
        .bind(pool.bonus_pool_consumed_subsidy)
        .bind(pool.status.as_str())
        .bind(&pool.import_batch)
        .bind(pool.last_allocation_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(conn: &mut PgConnection, pool_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM subsidy_pools WHERE id = $1")
            .bind(pool_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn soft_delete(
        conn: &mut PgConnection,
        pool_id: DbId,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE subsidy_pools \
             SET is_deleted = TRUE, status = 'deleted', deleted_at = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(pool_id)
        .bind(at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Page through pools, newest first, optionally filtered by status.
    pub async fn list(
        conn: &mut PgConnection,
        status: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PoolRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subsidy_pools \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, PoolRow>(&query)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn list_active(conn: &mut PgConnection) -> Result<Vec<PoolRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subsidy_pools WHERE NOT is_deleted ORDER BY student_id"
        );
        sqlx::query_as::<_, PoolRow>(&query)
            .fetch_all(&mut *conn)
            .await
    }

    /// Lock every live pool opened before `created_before`, in student order.
    pub async fn lock_active_created_before(
        conn: &mut PgConnection,
        created_before: Timestamp,
    ) -> Result<Vec<PoolRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM subsidy_pools \
             WHERE NOT is_deleted AND created_at < $1 \
             ORDER BY student_id \
             FOR UPDATE"
        );
        sqlx::query_as::<_, PoolRow>(&query)
            .bind(created_before)
            .fetch_all(&mut *conn)
            .await
    }
}
