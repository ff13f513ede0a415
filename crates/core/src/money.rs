//! Denomination constants and rounding helpers shared by the splitter and
//! the pool ledgers.

use rust_decimal::Decimal;

use crate::types::Money;

/// Task face values the splitter draws from, ascending.
pub const DENOMINATIONS: [i64; 5] = [5, 10, 15, 20, 25];

/// Smallest face value a generated task may carry.
pub const MIN_TASK_VALUE: i64 = 5;

/// Balances below this are settled by the small-remainder rule.
pub const SMALL_REMAINDER_CEILING: i64 = 10;

/// Small remainders at or above this round up to a 10 face value.
pub const ROUND_UP_THRESHOLD: i64 = 8;

/// Whole-unit amount as [`Money`].
pub fn money(units: i64) -> Money {
    Decimal::from(units)
}

/// Round to cents, midpoints away from zero.
pub fn round_money(value: Money) -> Money {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Tolerance used by the conservation checks (one cent).
pub fn conservation_epsilon() -> Money {
    Decimal::new(1, 2)
}

/// All denominations that do not exceed `cap`, ascending.
pub fn denominations_up_to(cap: Money) -> Vec<Money> {
    DENOMINATIONS
        .iter()
        .map(|&d| money(d))
        .filter(|d| *d <= cap)
        .collect()
}

/// Result of forcing a balance back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clamp {
    /// Name of the balance that would have gone negative.
    pub field: &'static str,
    /// How far below zero the unclamped value was.
    pub shortfall: Money,
}

/// Clamp `value` at zero, reporting the cut when one was needed.
pub fn clamp_non_negative(field: &'static str, value: Money) -> (Money, Option<Clamp>) {
    if value < Decimal::ZERO {
        (
            Decimal::ZERO,
            Some(Clamp {
                field,
                shortfall: -value,
            }),
        )
    } else {
        (value, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denominations_up_to_filters_by_cap() {
        assert_eq!(denominations_up_to(money(12)), vec![money(5), money(10)]);
        assert_eq!(denominations_up_to(money(25)).len(), 5);
        assert!(denominations_up_to(Decimal::new(499, 2)).is_empty());
    }

    #[test]
    fn round_money_keeps_two_places() {
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(money(12)), money(12));
    }

    #[test]
    fn clamp_reports_shortfall() {
        let (value, clamp) = clamp_non_negative("remaining_amount", Decimal::new(-350, 2));
        assert_eq!(value, Decimal::ZERO);
        assert_eq!(
            clamp,
            Some(Clamp {
                field: "remaining_amount",
                shortfall: Decimal::new(350, 2)
            })
        );
    }

    #[test]
    fn clamp_passes_non_negative_through() {
        assert_eq!(clamp_non_negative("x", money(3)), (money(3), None));
        assert_eq!(clamp_non_negative("x", Decimal::ZERO), (Decimal::ZERO, None));
    }
}
