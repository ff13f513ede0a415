//! Anomaly reporting for ledger arithmetic.
//!
//! Balances are clamped at zero instead of failing the operation; every
//! clamp and every broken identity is logged under the `vorder::anomaly`
//! target so it can be routed and alerted on separately.

use vorder_core::bonus::BonusPoolSnapshot;
use vorder_core::ledger::PoolSnapshot;
use vorder_core::money::Clamp;

pub(crate) const ANOMALY_TARGET: &str = "vorder::anomaly";

pub(crate) fn pool_clamp(pool: &PoolSnapshot, clamp: Option<Clamp>, operation: &'static str) {
    if let Some(clamp) = clamp {
        tracing::error!(
            target: ANOMALY_TARGET,
            student_id = pool.student_id,
            pool_id = pool.id,
            field = clamp.field,
            shortfall = %clamp.shortfall,
            operation,
            "Subsidy pool balance clamped at zero"
        );
    }
}

pub(crate) fn bonus_clamp(pool: &BonusPoolSnapshot, clamp: Option<Clamp>, operation: &'static str) {
    if let Some(clamp) = clamp {
        tracing::error!(
            target: ANOMALY_TARGET,
            pool_date = %pool.pool_date,
            field = clamp.field,
            shortfall = %clamp.shortfall,
            operation,
            "Bonus pool balance clamped at zero"
        );
    }
}

/// Log when `allocated + remaining` drifts from the subsidy total.
pub(crate) fn check_pool(pool: &PoolSnapshot, operation: &'static str) {
    if !pool.is_balanced() {
        tracing::error!(
            target: ANOMALY_TARGET,
            student_id = pool.student_id,
            pool_id = pool.id,
            gap = %pool.conservation_gap(),
            operation,
            "Subsidy pool does not balance"
        );
    }
}
