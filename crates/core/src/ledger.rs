//! Per-student subsidy pool bookkeeping.
//!
//! A pool tracks four buckets of the imported subsidy:
//!
//! - `remaining_amount`: not yet turned into open tasks.
//! - face value of open tasks (held outside the pool row).
//! - `consumed_subsidy`: real money paid out for completed tasks.
//! - `forfeited_amount`: moved to the daily bonus pool.
//!
//! `allocated_amount` is kept equal to `total_subsidy - remaining_amount`,
//! so the row-level identity `allocated + remaining == total` holds after
//! every mutation unless a balance had to be clamped at zero. Clamps are
//! returned to the caller, which logs them as anomalies.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{clamp_non_negative, conservation_epsilon, round_money, Clamp};
use crate::types::{DbId, Money, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    Active,
    Deleted,
}

impl PoolStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolStatus::Active => "active",
            PoolStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PoolStatus::Active),
            "deleted" => Ok(PoolStatus::Deleted),
            other => Err(format!("Unknown pool status '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Payout
// ---------------------------------------------------------------------------

/// Split of a completed task's face value between the student and the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Payout {
    pub face_value: Money,
    pub rebate_rate: Money,
    /// Real money paid to the student.
    pub student_income: Money,
    /// Unpaid part of the face value, returned to the pool.
    pub remaining_value: Money,
}

impl Payout {
    pub fn compute(face_value: Money, rebate_rate: Money) -> Self {
        let rate = rebate_rate.clamp(Decimal::ZERO, Decimal::ONE);
        let student_income = round_money(face_value * rate);
        Self {
            face_value,
            rebate_rate: rate,
            student_income,
            remaining_value: face_value - student_income,
        }
    }
}

// ---------------------------------------------------------------------------
// Pool snapshot
// ---------------------------------------------------------------------------

/// Fields for a pool created by a first import.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPool {
    pub student_id: DbId,
    pub student_name: String,
    pub total_subsidy: Money,
    pub import_batch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolSnapshot {
    pub id: DbId,
    pub student_id: DbId,
    pub student_name: String,
    pub total_subsidy: Money,
    pub allocated_amount: Money,
    pub remaining_amount: Money,
    /// Face-value sum of completed tasks.
    pub completed_amount: Money,
    /// Real payout sum of completed tasks.
    pub consumed_subsidy: Money,
    pub forfeited_amount: Money,
    pub bonus_pool_completed_amount: Money,
    pub bonus_pool_consumed_subsidy: Money,
    pub status: PoolStatus,
    pub import_batch: Option<String>,
    pub last_allocation_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl PoolSnapshot {
    /// State of a pool right after its first import: everything remaining.
    pub fn opened(id: DbId, new: &NewPool, created_at: Timestamp) -> Self {
        Self {
            id,
            student_id: new.student_id,
            student_name: new.student_name.clone(),
            total_subsidy: new.total_subsidy,
            allocated_amount: Decimal::ZERO,
            remaining_amount: new.total_subsidy,
            completed_amount: Decimal::ZERO,
            consumed_subsidy: Decimal::ZERO,
            forfeited_amount: Decimal::ZERO,
            bonus_pool_completed_amount: Decimal::ZERO,
            bonus_pool_consumed_subsidy: Decimal::ZERO,
            status: PoolStatus::Active,
            import_batch: new.import_batch.clone(),
            last_allocation_at: None,
            created_at,
        }
    }

    fn set_remaining(&mut self, value: Money) -> Option<Clamp> {
        let (remaining, clamp) = clamp_non_negative("remaining_amount", value);
        self.remaining_amount = remaining;
        self.allocated_amount = self.total_subsidy - remaining;
        clamp
    }

    /// Book a completed task: count its face value and payout, and return
    /// the unpaid remainder to `remaining_amount`.
    pub fn record_completion(&mut self, payout: &Payout) -> Option<Clamp> {
        self.completed_amount += payout.face_value;
        self.consumed_subsidy += payout.student_income;
        self.set_remaining(self.remaining_amount + payout.remaining_value)
    }

    /// Return the face value of tasks that expired unaccepted.
    pub fn record_expiry_return(&mut self, face_value: Money) -> Option<Clamp> {
        self.set_remaining(self.remaining_amount + face_value)
    }

    /// Move freshly generated face value out of `remaining_amount`.
    pub fn debit_generated(&mut self, generated: Money) -> Option<Clamp> {
        self.set_remaining(self.remaining_amount - generated)
    }

    /// Start over with `total_subsidy`, keeping `claimed` (face value of
    /// tasks students already accepted) committed.
    pub fn reset(&mut self, total_subsidy: Money, claimed: Money) -> Option<Clamp> {
        self.total_subsidy = total_subsidy;
        self.completed_amount = Decimal::ZERO;
        self.consumed_subsidy = Decimal::ZERO;
        self.forfeited_amount = Decimal::ZERO;
        self.set_remaining(total_subsidy - claimed)
    }

    /// Hand the whole remaining balance over to the bonus pool.
    pub fn forfeit_remaining(&mut self) -> Money {
        let amount = self.remaining_amount.max(Decimal::ZERO);
        self.forfeited_amount += amount;
        self.set_remaining(Decimal::ZERO);
        amount
    }

    /// Hand the face value of expired tasks over to the bonus pool instead of
    /// returning it to `remaining_amount`.
    pub fn forfeit_expired(&mut self, face_value: Money) {
        self.forfeited_amount += face_value;
    }

    /// Reporting counters for a bonus task this student completed.
    pub fn record_bonus_completion(&mut self, payout: &Payout) {
        self.bonus_pool_completed_amount += payout.face_value;
        self.bonus_pool_consumed_subsidy += payout.student_income;
    }

    /// `allocated + remaining - total`; zero for a healthy row.
    pub fn conservation_gap(&self) -> Money {
        self.allocated_amount + self.remaining_amount - self.total_subsidy
    }

    pub fn is_balanced(&self) -> bool {
        self.conservation_gap().abs() <= conservation_epsilon()
    }

    /// Gap of the full settlement identity
    /// `consumed + open + forfeited + remaining == total`, given the face
    /// value of the student's open tasks.
    pub fn settlement_gap(&self, open_face_value: Money) -> Money {
        self.consumed_subsidy + open_face_value + self.forfeited_amount + self.remaining_amount
            - self.total_subsidy
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::money::money;

    fn pool(total: i64) -> PoolSnapshot {
        PoolSnapshot::opened(
            1,
            &NewPool {
                student_id: 7,
                student_name: "Ana".into(),
                total_subsidy: money(total),
                import_batch: Some("b1".into()),
            },
            Utc::now(),
        )
    }

    #[test]
    fn payout_of_twenty_at_sixty_percent() {
        let payout = Payout::compute(money(20), Decimal::new(6, 1));
        assert_eq!(payout.student_income, money(12));
        assert_eq!(payout.remaining_value, money(8));
    }

    #[test]
    fn payout_clamps_out_of_range_rates() {
        assert_eq!(Payout::compute(money(20), money(3)).student_income, money(20));
        assert_eq!(Payout::compute(money(20), money(-1)).student_income, money(0));
    }

    #[test]
    fn opened_pool_keeps_everything_remaining() {
        let p = pool(100);
        assert_eq!(p.remaining_amount, money(100));
        assert_eq!(p.allocated_amount, money(0));
        assert!(p.is_balanced());
    }

    #[test]
    fn generation_then_completion_settles() {
        let mut p = pool(100);
        assert_eq!(p.debit_generated(money(20)), None);
        assert_eq!(p.settlement_gap(money(20)), Decimal::ZERO);

        let payout = Payout::compute(money(20), Decimal::new(6, 1));
        assert_eq!(p.record_completion(&payout), None);
        assert_eq!(p.consumed_subsidy, money(12));
        assert_eq!(p.completed_amount, money(20));
        assert_eq!(p.remaining_amount, money(88));
        assert_eq!(p.consumed_subsidy + p.remaining_amount, p.total_subsidy);
        assert!(p.is_balanced());
    }

    #[test]
    fn expiry_return_reverses_generation() {
        let mut p = pool(100);
        p.debit_generated(money(15));
        let allocated = p.allocated_amount;
        let remaining = p.remaining_amount;

        p.record_expiry_return(money(15));
        assert_eq!(p.remaining_amount, remaining + money(15));
        assert_eq!(p.allocated_amount, allocated - money(15));
        assert_eq!(p.consumed_subsidy, Decimal::ZERO);
    }

    #[test]
    fn over_debit_is_clamped_and_reported() {
        let mut p = pool(10);
        let clamp = p.debit_generated(money(25)).expect("clamp");
        assert_eq!(clamp.field, "remaining_amount");
        assert_eq!(clamp.shortfall, money(15));
        assert_eq!(p.remaining_amount, Decimal::ZERO);
        assert!(p.is_balanced());
    }

    #[test]
    fn reset_keeps_claimed_value_committed() {
        let mut p = pool(100);
        p.debit_generated(money(40));
        p.record_completion(&Payout::compute(money(20), Decimal::new(6, 1)));

        assert_eq!(p.reset(money(80), money(15)), None);
        assert_eq!(p.total_subsidy, money(80));
        assert_eq!(p.remaining_amount, money(65));
        assert_eq!(p.completed_amount, Decimal::ZERO);
        assert_eq!(p.consumed_subsidy, Decimal::ZERO);
        assert_eq!(p.settlement_gap(money(15)), Decimal::ZERO);
    }

    #[test]
    fn reset_below_claimed_value_clamps() {
        let mut p = pool(100);
        let clamp = p.reset(money(10), money(25)).expect("clamp");
        assert_eq!(clamp.shortfall, money(15));
        assert_eq!(p.remaining_amount, Decimal::ZERO);
    }

    #[test]
    fn forfeit_moves_remaining_out() {
        let mut p = pool(50);
        p.debit_generated(money(20));
        assert_eq!(p.forfeit_remaining(), money(30));
        assert_eq!(p.remaining_amount, Decimal::ZERO);
        assert_eq!(p.forfeited_amount, money(30));
        assert_eq!(p.settlement_gap(money(20)), Decimal::ZERO);

        p.forfeit_expired(money(20));
        assert_eq!(p.settlement_gap(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn status_parses() {
        assert_eq!("active".parse::<PoolStatus>(), Ok(PoolStatus::Active));
        assert!("gone".parse::<PoolStatus>().is_err());
    }
}
