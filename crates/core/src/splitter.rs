//! Amount splitting: turns a subsidy balance into discrete task face values.
//!
//! Every function takes the random source as a parameter so callers (and
//! tests) control reproducibility. Values are drawn uniformly from
//! [`DENOMINATIONS`](crate::money::DENOMINATIONS) capped at the balance being
//! split. A full split ends with whatever is left under 10; lazy and bonus
//! generation settle small balances by the small-remainder rule.

use rand::seq::IndexedRandom;
use rand::Rng;
use rust_decimal::Decimal;

use crate::money::{
    denominations_up_to, money, round_money, MIN_TASK_VALUE, ROUND_UP_THRESHOLD,
    SMALL_REMAINDER_CEILING,
};
use crate::types::Money;

// ---------------------------------------------------------------------------
// Small-remainder rule
// ---------------------------------------------------------------------------

/// Face value for a balance below 10.
///
/// Balances of 8 or more round up to 10, anything smaller to 5. When the
/// rounded value would exceed `cap` the balance itself is returned, so
/// callers that must not over-generate pass the balance as the cap.
pub fn settle_small(remaining: Money, cap: Money) -> Money {
    let face = if remaining >= money(ROUND_UP_THRESHOLD) {
        money(SMALL_REMAINDER_CEILING)
    } else {
        money(MIN_TASK_VALUE)
    };
    if face <= cap {
        face
    } else {
        remaining
    }
}

fn draw<R: Rng + ?Sized>(cap: Money, rng: &mut R) -> Option<Money> {
    denominations_up_to(cap).choose(rng).copied()
}

// ---------------------------------------------------------------------------
// Full split
// ---------------------------------------------------------------------------

/// Split `total` into face values whose sum is exactly `total`.
///
/// A balance left under 10 becomes one final task as-is. Non-positive
/// totals produce no tasks.
pub fn split<R: Rng + ?Sized>(total: Money, rng: &mut R) -> Vec<Money> {
    let mut remaining = round_money(total);
    let mut values = Vec::new();

    while remaining > Decimal::ZERO {
        let value = if remaining < money(SMALL_REMAINDER_CEILING) {
            remaining
        } else {
            match draw(remaining, rng) {
                Some(value) => value,
                None => settle_small(remaining, remaining),
            }
        };
        values.push(value);
        remaining -= value;
    }

    values
}

// ---------------------------------------------------------------------------
// On-demand split
// ---------------------------------------------------------------------------

/// Produce at most two face values for lazy generation.
///
/// The sum never exceeds `total`; whatever is not emitted stays with the
/// caller as un-generated balance.
pub fn split_on_demand<R: Rng + ?Sized>(total: Money, rng: &mut R) -> Vec<Money> {
    let total = round_money(total);
    if total <= Decimal::ZERO {
        return Vec::new();
    }
    if total < money(SMALL_REMAINDER_CEILING) {
        return vec![settle_small(total, total)];
    }

    let first = draw(total, rng).unwrap_or_else(|| settle_small(total, total));
    let mut values = vec![first];

    let rest = total - first;
    if rest > Decimal::ZERO && rng.random_bool(0.5) {
        let second = if rest < money(SMALL_REMAINDER_CEILING) {
            settle_small(rest, rest)
        } else {
            draw(rest, rng).unwrap_or_else(|| settle_small(rest, rest))
        };
        values.push(second);
    }

    values
}

// ---------------------------------------------------------------------------
// Bonus pool denomination
// ---------------------------------------------------------------------------

/// Face value for a single bonus-pool task drawn against `available`.
///
/// Bonus tasks are debited by real payout rather than face value, so small
/// balances round up to 10 or 5 without a cap. Returns `None` when nothing
/// is available.
pub fn bonus_denomination<R: Rng + ?Sized>(available: Money, rng: &mut R) -> Option<Money> {
    let available = round_money(available);
    if available <= Decimal::ZERO {
        return None;
    }
    if available < money(SMALL_REMAINDER_CEILING) {
        return Some(settle_small(available, money(SMALL_REMAINDER_CEILING)));
    }
    draw(available, rng)
}
