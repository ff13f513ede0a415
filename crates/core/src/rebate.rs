//! Rebate-rate parsing.
//!
//! Agent records store the rebate as free text: `"60%"`, `"60"` and `"0.6"`
//! all mean the same rate. Anything unparseable falls back to the default.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::types::Money;

/// Rate applied when the acceptor's agent record cannot be resolved.
pub fn default_rebate_rate() -> Money {
    Decimal::new(6, 1)
}

/// Parse a stored rebate into a rate in `[0, 1]`.
pub fn parse_rebate_rate(raw: &str) -> Option<Money> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    if trimmed.is_empty() {
        return None;
    }
    let value = Decimal::from_str(trimmed).ok()?;
    let rate = if value > Decimal::ONE {
        value / Decimal::ONE_HUNDRED
    } else {
        value
    };
    (Decimal::ZERO..=Decimal::ONE).contains(&rate).then_some(rate)
}

/// Parse `raw`, falling back to `default` when it is missing or invalid.
pub fn resolve_rebate_rate(raw: Option<&str>, default: Money) -> Money {
    raw.and_then(parse_rebate_rate).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_forms_are_equivalent() {
        let expected = Some(Decimal::new(6, 1));
        assert_eq!(parse_rebate_rate("60%"), expected);
        assert_eq!(parse_rebate_rate("60"), expected);
        assert_eq!(parse_rebate_rate("0.6"), expected);
        assert_eq!(parse_rebate_rate(" 60 % "), expected);
    }

    #[test]
    fn one_means_full_rate() {
        assert_eq!(parse_rebate_rate("1"), Some(Decimal::ONE));
    }

    #[test]
    fn garbage_and_out_of_range_are_rejected() {
        assert_eq!(parse_rebate_rate("abc"), None);
        assert_eq!(parse_rebate_rate(""), None);
        assert_eq!(parse_rebate_rate("%"), None);
        assert_eq!(parse_rebate_rate("250"), None);
        assert_eq!(parse_rebate_rate("-0.2"), None);
    }

    #[test]
    fn resolve_falls_back_to_default() {
        assert_eq!(resolve_rebate_rate(None, default_rebate_rate()), Decimal::new(6, 1));
        assert_eq!(
            resolve_rebate_rate(Some("junk"), default_rebate_rate()),
            Decimal::new(6, 1)
        );
        assert_eq!(
            resolve_rebate_rate(Some("75%"), default_rebate_rate()),
            Decimal::new(75, 2)
        );
    }
}
