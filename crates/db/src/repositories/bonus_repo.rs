//! Repository for `bonus_pools` and `student_daily_achievements`.

use chrono::NaiveDate;
use sqlx::PgConnection;
use vorder_core::bonus::{BonusPoolSnapshot, DailyAchievement};
use vorder_core::types::DbId;

use crate::models::bonus::{AchievementRow, BonusPoolRow};

/// Column list for `bonus_pools` queries.
const POOL_COLUMNS: &str = "\
    id, pool_date, carry_forward_amount, new_expired_amount, total_amount, \
    generated_amount, completed_amount, remaining_amount, created_at";

/// Column list for `student_daily_achievements` queries.
const ACHIEVEMENT_COLUMNS: &str = "\
    student_id, student_name, achievement_date, daily_target, completed_amount, is_achieved";

pub struct BonusRepo;

impl BonusRepo {
    pub async fn find_pool(
        conn: &mut PgConnection,
        pool_date: NaiveDate,
    ) -> Result<Option<BonusPoolRow>, sqlx::Error> {
        let query = format!("SELECT {POOL_COLUMNS} FROM bonus_pools WHERE pool_date = $1");
        sqlx::query_as::<_, BonusPoolRow>(&query)
            .bind(pool_date)
            .fetch_optional(&mut *conn)
            .await
    }

    pub async fn lock_pool(
        conn: &mut PgConnection,
        pool_date: NaiveDate,
    ) -> Result<Option<BonusPoolRow>, sqlx::Error> {
        let query = format!(
            "SELECT {POOL_COLUMNS} FROM bonus_pools WHERE pool_date = $1 FOR UPDATE"
        );
        sqlx::query_as::<_, BonusPoolRow>(&query)
            .bind(pool_date)
            .fetch_optional(&mut *conn)
            .await
    }

    /// Insert an empty pool for the date; an existing row is returned locked
    /// instead of failing on the unique date.
    pub async fn insert_pool(
        conn: &mut PgConnection,
        pool_date: NaiveDate,
    ) -> Result<BonusPoolRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO bonus_pools (pool_date) VALUES ($1) \
             ON CONFLICT ON CONSTRAINT uq_bonus_pools_date DO NOTHING \
             RETURNING {POOL_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, BonusPoolRow>(&query)
            .bind(pool_date)
            .fetch_optional(&mut *conn)
            .await?;
        match inserted {
            Some(row) => Ok(row),
            None => Self::lock_pool(conn, pool_date)
                .await?
                .ok_or(sqlx::Error::RowNotFound),
        }
    }

    pub async fn save_pool(
        conn: &mut PgConnection,
        pool: &BonusPoolSnapshot,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE bonus_pools SET \
                carry_forward_amount = $2, new_expired_amount = $3, total_amount = $4, \
                generated_amount = $5, completed_amount = $6, remaining_amount = $7, \
                updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(pool.id)
        .bind(pool.carry_forward_amount)
        .bind(pool.new_expired_amount)
        .bind(pool.total_amount)
        .bind(pool.generated_amount)
        .bind(pool.completed_amount)
        .bind(pool.remaining_amount)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn find_achievement(
        conn: &mut PgConnection,
        student_id: DbId,
        date: NaiveDate,
    ) -> Result<Option<AchievementRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ACHIEVEMENT_COLUMNS} FROM student_daily_achievements \
             WHERE student_id = $1 AND achievement_date = $2"
        );
        sqlx::query_as::<_, AchievementRow>(&query)
            .bind(student_id)
            .bind(date)
            .fetch_optional(&mut *conn)
            .await
    }

    pub async fn upsert_achievement(
        conn: &mut PgConnection,
        achievement: &DailyAchievement,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO student_daily_achievements \
                (student_id, student_name, achievement_date, daily_target, \
                 completed_amount, is_achieved) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT ON CONSTRAINT uq_student_daily_achievement DO UPDATE SET \
                student_name = EXCLUDED.student_name, \
                daily_target = EXCLUDED.daily_target, \
                completed_amount = EXCLUDED.completed_amount, \
                is_achieved = EXCLUDED.is_achieved, \
                updated_at = NOW()",
        )
        .bind(achievement.student_id)
        .bind(&achievement.student_name)
        .bind(achievement.achievement_date)
        .bind(achievement.daily_target)
        .bind(achievement.completed_amount)
        .bind(achievement.is_achieved)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn achievements_on(
        conn: &mut PgConnection,
        date: NaiveDate,
    ) -> Result<Vec<AchievementRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ACHIEVEMENT_COLUMNS} FROM student_daily_achievements \
             WHERE achievement_date = $1 \
             ORDER BY student_id"
        );
        sqlx::query_as::<_, AchievementRow>(&query)
            .bind(date)
            .fetch_all(&mut *conn)
            .await
    }
}
