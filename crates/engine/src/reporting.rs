//! Read-only aggregates for operators.

use rust_decimal::Decimal;
use serde::Serialize;
use vorder_core::store::OverviewStats;
use vorder_core::types::Money;

use crate::{EngineResult, VirtualOrderEngine};

#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    #[serde(flatten)]
    pub stats: OverviewStats,
    /// Completed share of all live virtual tasks, in percent.
    pub completion_rate: Money,
    /// Consumed share of all imported subsidy, in percent.
    pub consumption_rate: Money,
}

fn percent(part: Money, whole: Money) -> Money {
    if whole <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        (part * Decimal::ONE_HUNDRED / whole).round_dp(2)
    }
}

impl Overview {
    pub fn from_stats(stats: OverviewStats) -> Self {
        Self {
            completion_rate: percent(
                Decimal::from(stats.tasks_completed),
                Decimal::from(stats.tasks_generated),
            ),
            consumption_rate: percent(stats.consumed_subsidy, stats.total_subsidy),
            stats,
        }
    }
}

impl VirtualOrderEngine {
    pub async fn overview(&self) -> EngineResult<Overview> {
        let mut tx = self.store.begin().await?;
        Ok(Overview::from_stats(tx.overview().await?))
    }
}

#[cfg(test)]
mod tests {
    use vorder_core::money::money;

    use super::*;

    #[test]
    fn rates_are_percentages() {
        let overview = Overview::from_stats(OverviewStats {
            students: 2,
            total_subsidy: money(200),
            consumed_subsidy: money(30),
            remaining_amount: money(100),
            tasks_generated: 8,
            tasks_completed: 2,
            open_tasks: 6,
        });
        assert_eq!(overview.completion_rate, money(25));
        assert_eq!(overview.consumption_rate, money(15));
    }

    #[test]
    fn empty_system_reports_zero() {
        let overview = Overview::from_stats(OverviewStats::default());
        assert_eq!(overview.completion_rate, Decimal::ZERO);
        assert_eq!(overview.consumption_rate, Decimal::ZERO);
    }
}
