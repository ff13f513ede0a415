//! Repository for virtual rows of the `tasks` table.
//!
//! Status literals are the persisted codes of
//! [`TaskStatus`](vorder_core::task::TaskStatus): `'0'` unaccepted through
//! `'5'` terminated.

use chrono::NaiveDate;
use sqlx::PgConnection;
use vorder_core::task::{NewTask, TaskChange, TaskStatus};
use vorder_core::types::{DbId, Money, Timestamp};

use crate::models::stats::StatusCountRow;
use crate::models::task::TaskRow;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, summary, requirement, category, order_number, commission, status, is_virtual, \
    target_student_id, is_bonus_pool, bonus_pool_date, founder_id, founder, \
    accepted_by, accepted_at, submitted_at, completed_at, settled_income, value_recycled, \
    end_date, delivery_date, created_at";

/// Predicate for a student's own tasks whose value is due back to the pool:
/// unaccepted past deadline, or terminated and not yet recycled.
const EXPIRED_STUDENT_TASK: &str = "\
    is_virtual AND NOT is_bonus_pool AND target_student_id IS NOT NULL \
    AND ((status = '0' AND end_date <= $1) OR (status = '5' AND NOT value_recycled))";

pub struct TaskRepo;

impl TaskRepo {
    pub async fn find(
        conn: &mut PgConnection,
        task_id: DbId,
    ) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(task_id)
            .fetch_optional(&mut *conn)
            .await
    }

    pub async fn lock(
        conn: &mut PgConnection,
        task_id: DbId,
    ) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(task_id)
            .fetch_optional(&mut *conn)
            .await
    }

    pub async fn insert(conn: &mut PgConnection, task: &NewTask) -> Result<TaskRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                (summary, requirement, category, order_number, commission, status, is_virtual, \
                 target_student_id, is_bonus_pool, bonus_pool_date, founder_id, founder, \
                 end_date, delivery_date) \
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(&task.summary)
            .bind(&task.requirement)
            .bind(&task.category)
            .bind(&task.order_number)
            .bind(task.commission)
            .bind(TaskStatus::Unaccepted.code())
            .bind(task.target_student_id)
            .bind(task.is_bonus_pool)
            .bind(task.bonus_pool_date)
            .bind(task.founder_id)
            .bind(&task.founder)
            .bind(task.end_date)
            .bind(task.delivery_date)
            .fetch_one(&mut *conn)
            .await
    }

    /// Conditional status change. Returns `None` when the task's current
    /// status is not one of `from`, which is how concurrent changes lose.
    pub async fn transition(
        conn: &mut PgConnection,
        task_id: DbId,
        from: &[TaskStatus],
        change: &TaskChange,
    ) -> Result<Option<TaskRow>, sqlx::Error> {
        let from_codes: Vec<String> = from.iter().map(|s| s.code().to_string()).collect();
        let query = format!(
            "UPDATE tasks SET \
                status = $2, \
                accepted_by = COALESCE($3, accepted_by), \
                accepted_at = COALESCE($4, accepted_at), \
                submitted_at = COALESCE($5, submitted_at), \
                completed_at = COALESCE($6, completed_at), \
                settled_income = COALESCE($7, settled_income), \
                value_recycled = COALESCE($8, value_recycled), \
                updated_at = NOW() \
             WHERE id = $1 AND status = ANY($9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(task_id)
            .bind(change.status.code())
            .bind(&change.accepted_by)
            .bind(change.accepted_at)
            .bind(change.submitted_at)
            .bind(change.completed_at)
            .bind(change.settled_income)
            .bind(change.value_recycled)
            .bind(&from_codes)
            .fetch_optional(&mut *conn)
            .await
    }

    pub async fn delete_many(
        conn: &mut PgConnection,
        task_ids: &[DbId],
    ) -> Result<u64, sqlx::Error> {
        if task_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM tasks WHERE id = ANY($1)")
            .bind(task_ids)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_recycled(
        conn: &mut PgConnection,
        task_ids: &[DbId],
        at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        if task_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "UPDATE tasks SET value_recycled = TRUE, recycled_at = $2, updated_at = NOW() \
             WHERE id = ANY($1) AND NOT value_recycled",
        )
        .bind(task_ids)
        .bind(at)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_founder(
        conn: &mut PgConnection,
        task_id: DbId,
        service_id: DbId,
        founder: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tasks SET founder_id = $2, founder = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(task_id)
        .bind(service_id)
        .bind(founder)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn lock_unaccepted_for_student(
        conn: &mut PgConnection,
        student_id: DbId,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE is_virtual AND NOT is_bonus_pool AND target_student_id = $1 AND status = '0' \
             ORDER BY id \
             FOR UPDATE"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(student_id)
            .fetch_all(&mut *conn)
            .await
    }

    /// Sum of face values of the student's own tasks in any of `statuses`.
    pub async fn student_value_in(
        conn: &mut PgConnection,
        student_id: DbId,
        statuses: &[TaskStatus],
    ) -> Result<Money, sqlx::Error> {
        let codes: Vec<String> = statuses.iter().map(|s| s.code().to_string()).collect();
        sqlx::query_scalar::<_, Money>(
            "SELECT COALESCE(SUM(commission), 0) FROM tasks \
             WHERE is_virtual AND NOT is_bonus_pool AND target_student_id = $1 \
               AND status = ANY($2)",
        )
        .bind(student_id)
        .bind(&codes)
        .fetch_one(&mut *conn)
        .await
    }

    pub async fn students_with_expired(
        conn: &mut PgConnection,
        now: Timestamp,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        let query = format!(
            "SELECT DISTINCT target_student_id FROM tasks \
             WHERE {EXPIRED_STUDENT_TASK} \
             ORDER BY target_student_id"
        );
        sqlx::query_scalar::<_, DbId>(&query)
            .bind(now)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn lock_expired_for_student(
        conn: &mut PgConnection,
        student_id: DbId,
        now: Timestamp,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE {EXPIRED_STUDENT_TASK} AND target_student_id = $2 \
             ORDER BY id \
             FOR UPDATE"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(now)
            .bind(student_id)
            .fetch_all(&mut *conn)
            .await
    }

    /// Unaccepted personal tasks past deadline that were created before
    /// `created_before` and slipped through the periodic sweep.
    pub async fn lock_stale_unaccepted(
        conn: &mut PgConnection,
        created_before: Timestamp,
        now: Timestamp,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE is_virtual AND NOT is_bonus_pool AND status = '0' \
               AND end_date <= $2 AND created_at < $1 \
             ORDER BY target_student_id, id \
             FOR UPDATE"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(created_before)
            .bind(now)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn bonus_dates_with_expired(
        conn: &mut PgConnection,
        now: Timestamp,
    ) -> Result<Vec<NaiveDate>, sqlx::Error> {
        sqlx::query_scalar::<_, NaiveDate>(
            "SELECT DISTINCT bonus_pool_date FROM tasks \
             WHERE is_bonus_pool AND status = '0' AND end_date <= $1 \
               AND bonus_pool_date IS NOT NULL \
             ORDER BY bonus_pool_date",
        )
        .bind(now)
        .fetch_all(&mut *conn)
        .await
    }

    pub async fn lock_expired_bonus(
        conn: &mut PgConnection,
        pool_date: NaiveDate,
        now: Timestamp,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE is_bonus_pool AND bonus_pool_date = $1 AND status = '0' AND end_date <= $2 \
             ORDER BY id \
             FOR UPDATE"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(pool_date)
            .bind(now)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn open_bonus(
        conn: &mut PgConnection,
        pool_date: NaiveDate,
        lock: bool,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let suffix = if lock { " FOR UPDATE" } else { "" };
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE is_bonus_pool AND bonus_pool_date = $1 AND status = '0' \
             ORDER BY id{suffix}"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(pool_date)
            .fetch_all(&mut *conn)
            .await
    }

    pub async fn submitted_before(
        conn: &mut PgConnection,
        submitted_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM tasks \
             WHERE is_virtual AND status = '3' AND submitted_at <= $1 \
             ORDER BY submitted_at, id \
             LIMIT $2",
        )
        .bind(submitted_before)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await
    }

    pub async fn lock_unaccepted_by_founder(
        conn: &mut PgConnection,
        service_id: DbId,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE is_virtual AND founder_id = $1 AND status = '0' \
             ORDER BY id \
             FOR UPDATE"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(service_id)
            .fetch_all(&mut *conn)
            .await
    }

    /// Unsettled tasks the student can see: their own, plus bonus tasks they
    /// have taken.
    pub async fn open_for_student(
        conn: &mut PgConnection,
        student_id: DbId,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE is_virtual AND status IN ('0', '1', '2', '3') \
               AND ((NOT is_bonus_pool AND target_student_id = $1) \
                    OR (is_bonus_pool AND accepted_by = $2)) \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(student_id)
            .bind(student_id.to_string())
            .fetch_all(&mut *conn)
            .await
    }

    /// Real payout of the student's own tasks settled in `[from, to)`.
    /// Bonus tasks never count.
    pub async fn settled_income_between(
        conn: &mut PgConnection,
        student_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Money, sqlx::Error> {
        sqlx::query_scalar::<_, Money>(
            "SELECT COALESCE(SUM(settled_income), 0) FROM tasks \
             WHERE is_virtual AND status = '4' \
               AND NOT is_bonus_pool AND target_student_id = $1 \
               AND completed_at >= $2 AND completed_at < $3",
        )
        .bind(student_id)
        .bind(from)
        .bind(to)
        .fetch_one(&mut *conn)
        .await
    }

    pub async fn bonus_status_counts(
        conn: &mut PgConnection,
        pool_date: NaiveDate,
    ) -> Result<Vec<StatusCountRow>, sqlx::Error> {
        sqlx::query_as::<_, StatusCountRow>(
            "SELECT status, COUNT(*) AS count FROM tasks \
             WHERE is_bonus_pool AND bonus_pool_date = $1 \
             GROUP BY status",
        )
        .bind(pool_date)
        .fetch_all(&mut *conn)
        .await
    }
}
