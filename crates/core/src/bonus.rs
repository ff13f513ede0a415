//! Daily bonus pool bookkeeping and achievement gating.
//!
//! One bonus pool exists per calendar date. Its `remaining_amount` only
//! moves by real payouts of completed bonus tasks; `generated_amount` holds
//! the face value of bonus tasks that are still open, so the balance that
//! may still be turned into new tasks is `remaining - generated`.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::ledger::Payout;
use crate::money::{clamp_non_negative, Clamp};
use crate::types::{DbId, Money, Timestamp};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BonusPoolSnapshot {
    pub id: DbId,
    pub pool_date: NaiveDate,
    /// Unused balance taken over from the previous day's pool.
    pub carry_forward_amount: Money,
    /// Forfeited student subsidy and expired task value collected for this day.
    pub new_expired_amount: Money,
    pub total_amount: Money,
    pub generated_amount: Money,
    pub completed_amount: Money,
    pub remaining_amount: Money,
    pub created_at: Timestamp,
}

impl BonusPoolSnapshot {
    pub fn empty(id: DbId, pool_date: NaiveDate, created_at: Timestamp) -> Self {
        Self {
            id,
            pool_date,
            carry_forward_amount: Decimal::ZERO,
            new_expired_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            generated_amount: Decimal::ZERO,
            completed_amount: Decimal::ZERO,
            remaining_amount: Decimal::ZERO,
            created_at,
        }
    }

    /// Balance not yet paid out nor held by open tasks.
    pub fn available(&self) -> Money {
        (self.remaining_amount - self.generated_amount).max(Decimal::ZERO)
    }

    /// Real money already paid out of this pool.
    pub fn paid_out(&self) -> Money {
        self.total_amount - self.remaining_amount
    }

    /// Recompute the totals from a fresh carry-forward figure plus newly
    /// collected expired value. Payouts already made are preserved.
    pub fn rebase(&mut self, carry_forward: Money, collected: Money) -> Option<Clamp> {
        let paid_out = self.paid_out();
        self.carry_forward_amount = carry_forward;
        self.new_expired_amount += collected;
        self.total_amount = self.carry_forward_amount + self.new_expired_amount;
        let (remaining, clamp) =
            clamp_non_negative("remaining_amount", self.total_amount - paid_out);
        self.remaining_amount = remaining;
        clamp
    }

    pub fn record_generated(&mut self, face_value: Money) {
        self.generated_amount += face_value;
    }

    /// Debit the real payout only; the face value leaves `generated_amount`.
    pub fn record_completion(&mut self, payout: &Payout) -> Option<Clamp> {
        self.completed_amount += payout.face_value;
        let (generated, _) =
            clamp_non_negative("generated_amount", self.generated_amount - payout.face_value);
        self.generated_amount = generated;
        let (remaining, clamp) = clamp_non_negative(
            "remaining_amount",
            self.remaining_amount - payout.student_income,
        );
        self.remaining_amount = remaining;
        clamp
    }

    /// Release the face value of bonus tasks dropped unaccepted.
    pub fn record_expiry(&mut self, face_value: Money) -> Option<Clamp> {
        let (generated, clamp) =
            clamp_non_negative("generated_amount", self.generated_amount - face_value);
        self.generated_amount = generated;
        clamp
    }
}

// ---------------------------------------------------------------------------
// Achievements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAchievement {
    pub student_id: DbId,
    pub student_name: String,
    pub achievement_date: NaiveDate,
    pub daily_target: Money,
    /// Real payout settled from the student's own subsidy tasks that day.
    /// Bonus tasks they took do not count.
    pub completed_amount: Money,
    pub is_achieved: bool,
}

impl DailyAchievement {
    pub fn evaluate(
        student_id: DbId,
        student_name: impl Into<String>,
        achievement_date: NaiveDate,
        daily_target: Money,
        completed_amount: Money,
    ) -> Self {
        Self {
            student_id,
            student_name: student_name.into(),
            achievement_date,
            daily_target,
            completed_amount,
            is_achieved: completed_amount >= daily_target,
        }
    }
}

/// A student may work bonus tasks dated `today` only if they achieved the
/// previous day's target.
pub fn has_bonus_access(yesterday: Option<&DailyAchievement>) -> bool {
    yesterday.is_some_and(|a| a.is_achieved)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AchievementSummary {
    pub date: NaiveDate,
    pub total_students: usize,
    pub achieved_students: usize,
    /// Percentage, two decimal places.
    pub achievement_rate: Money,
}

impl AchievementSummary {
    pub fn from_records(date: NaiveDate, records: &[DailyAchievement]) -> Self {
        let total_students = records.len();
        let achieved_students = records.iter().filter(|r| r.is_achieved).count();
        let achievement_rate = if total_students == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(achieved_students as u64) * Decimal::ONE_HUNDRED
                / Decimal::from(total_students as u64))
            .round_dp(2)
        };
        Self {
            date,
            total_students,
            achieved_students,
            achievement_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::money::money;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date")
    }

    fn pool_with(total: i64) -> BonusPoolSnapshot {
        let mut pool = BonusPoolSnapshot::empty(1, date(), Utc::now());
        pool.rebase(Decimal::ZERO, money(total));
        pool
    }

    #[test]
    fn rebase_sums_sources() {
        let mut pool = BonusPoolSnapshot::empty(1, date(), Utc::now());
        pool.rebase(money(30), money(45));
        assert_eq!(pool.total_amount, money(75));
        assert_eq!(pool.remaining_amount, money(75));
    }

    #[test]
    fn rebase_is_additive_for_collected_value_only() {
        let mut pool = pool_with(40);
        pool.rebase(money(10), money(5));
        pool.rebase(money(10), Decimal::ZERO);
        assert_eq!(pool.carry_forward_amount, money(10));
        assert_eq!(pool.new_expired_amount, money(45));
        assert_eq!(pool.total_amount, money(55));
    }

    #[test]
    fn completion_debits_real_payout_only() {
        let mut pool = pool_with(100);
        pool.record_generated(money(20));
        assert_eq!(pool.available(), money(80));

        let payout = Payout::compute(money(20), Decimal::new(6, 1));
        assert_eq!(pool.record_completion(&payout), None);
        assert_eq!(pool.remaining_amount, money(88));
        assert_eq!(pool.generated_amount, Decimal::ZERO);
        assert_eq!(pool.completed_amount, money(20));
        assert_eq!(pool.available(), money(88));
    }

    #[test]
    fn rebase_preserves_payouts() {
        let mut pool = pool_with(100);
        pool.record_generated(money(20));
        pool.record_completion(&Payout::compute(money(20), Decimal::new(6, 1)));
        pool.rebase(Decimal::ZERO, money(10));
        assert_eq!(pool.total_amount, money(110));
        assert_eq!(pool.remaining_amount, money(98));
    }

    #[test]
    fn expiry_releases_generated_value() {
        let mut pool = pool_with(50);
        pool.record_generated(money(25));
        assert_eq!(pool.record_expiry(money(25)), None);
        assert_eq!(pool.available(), money(50));
        assert_eq!(pool.remaining_amount, money(50));
    }

    #[test]
    fn overpaid_pool_is_clamped() {
        let mut pool = pool_with(5);
        pool.record_generated(money(25));
        let clamp = pool
            .record_completion(&Payout::compute(money(25), Decimal::ONE))
            .expect("clamp");
        assert_eq!(clamp.shortfall, money(20));
        assert_eq!(pool.remaining_amount, Decimal::ZERO);
    }

    #[test]
    fn achievement_is_inclusive_of_target() {
        let a = DailyAchievement::evaluate(1, "Ana", date(), money(50), money(50));
        assert!(a.is_achieved);
        let b = DailyAchievement::evaluate(2, "Ben", date(), money(50), Decimal::new(4999, 2));
        assert!(!b.is_achieved);
    }

    #[test]
    fn access_requires_an_achieved_record() {
        let achieved = DailyAchievement::evaluate(1, "Ana", date(), money(50), money(60));
        let missed = DailyAchievement::evaluate(1, "Ana", date(), money(50), money(10));
        assert!(has_bonus_access(Some(&achieved)));
        assert!(!has_bonus_access(Some(&missed)));
        assert!(!has_bonus_access(None));
    }

    #[test]
    fn summary_rate() {
        let records = vec![
            DailyAchievement::evaluate(1, "a", date(), money(50), money(60)),
            DailyAchievement::evaluate(2, "b", date(), money(50), money(10)),
            DailyAchievement::evaluate(3, "c", date(), money(50), money(0)),
        ];
        let summary = AchievementSummary::from_records(date(), &records);
        assert_eq!(summary.achieved_students, 1);
        assert_eq!(summary.achievement_rate, Decimal::new(3333, 2));
    }
}
