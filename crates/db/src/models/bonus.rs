use chrono::NaiveDate;
use sqlx::FromRow;
use vorder_core::bonus::{BonusPoolSnapshot, DailyAchievement};
use vorder_core::types::{DbId, Money, Timestamp};

/// A row from the `bonus_pools` table.
#[derive(Debug, Clone, FromRow)]
pub struct BonusPoolRow {
    pub id: DbId,
    pub pool_date: NaiveDate,
    pub carry_forward_amount: Money,
    pub new_expired_amount: Money,
    pub total_amount: Money,
    pub generated_amount: Money,
    pub completed_amount: Money,
    pub remaining_amount: Money,
    pub created_at: Timestamp,
}

impl From<BonusPoolRow> for BonusPoolSnapshot {
    fn from(row: BonusPoolRow) -> Self {
        BonusPoolSnapshot {
            id: row.id,
            pool_date: row.pool_date,
            carry_forward_amount: row.carry_forward_amount,
            new_expired_amount: row.new_expired_amount,
            total_amount: row.total_amount,
            generated_amount: row.generated_amount,
            completed_amount: row.completed_amount,
            remaining_amount: row.remaining_amount,
            created_at: row.created_at,
        }
    }
}

/// A row from the `student_daily_achievements` table.
#[derive(Debug, Clone, FromRow)]
pub struct AchievementRow {
    pub student_id: DbId,
    pub student_name: String,
    pub achievement_date: NaiveDate,
    pub daily_target: Money,
    pub completed_amount: Money,
    pub is_achieved: bool,
}

impl From<AchievementRow> for DailyAchievement {
    fn from(row: AchievementRow) -> Self {
        DailyAchievement {
            student_id: row.student_id,
            student_name: row.student_name,
            achievement_date: row.achievement_date,
            daily_target: row.daily_target,
            completed_amount: row.completed_amount,
            is_achieved: row.is_achieved,
        }
    }
}
