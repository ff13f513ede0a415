//! Virtual customer-service identities and how work is spread across them.
//!
//! Ranking: priority is the identity's current open-task count, minus a
//! large boost for identities created recently, ascending, ties broken by
//! id. Tasks are then dealt out round-robin over the ranked list. There is
//! no per-identity load cap.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::{money, round_money, MIN_TASK_VALUE};
use crate::types::{DbId, Money, Timestamp};

/// Priority subtracted from identities inside the new-identity window.
pub const NEW_SERVICE_PRIORITY_BOOST: i64 = 100;

/// How long an identity counts as new.
pub const NEW_SERVICE_WINDOW_HOURS: i64 = 24;

/// Base weight for the relative-average strategy.
const WEIGHT_BASE: i64 = 100;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Active,
    Inactive,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ServiceStatus::Active),
            "inactive" => Ok(ServiceStatus::Inactive),
            other => Err(format!("Unknown service status '{other}'")),
        }
    }
}

/// A persisted virtual customer-service identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualService {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    pub account: String,
    pub status: ServiceStatus,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewVirtualService {
    pub user_id: DbId,
    pub name: String,
    pub account: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateVirtualService {
    pub name: Option<String>,
    pub status: Option<ServiceStatus>,
}

/// An active identity with its current open-task count.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceLoad {
    pub service_id: DbId,
    pub user_id: DbId,
    pub name: String,
    pub created_at: Timestamp,
    pub current_task_count: i64,
}

/// Ranking entry recomputed for every allocation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualServiceAllocation {
    pub service_id: DbId,
    pub user_id: DbId,
    pub service_name: String,
    pub current_task_count: i64,
    /// Lower is more eligible.
    pub priority: i64,
    pub is_new: bool,
}

/// Knobs for [`rank`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityPolicy {
    pub new_service_boost: i64,
    pub new_service_window: Duration,
}

impl Default for PriorityPolicy {
    fn default() -> Self {
        Self {
            new_service_boost: NEW_SERVICE_PRIORITY_BOOST,
            new_service_window: Duration::hours(NEW_SERVICE_WINDOW_HOURS),
        }
    }
}

/// Rank identities by ascending priority, ties by id.
pub fn rank(
    loads: &[ServiceLoad],
    now: Timestamp,
    policy: &PriorityPolicy,
) -> Vec<VirtualServiceAllocation> {
    let mut ranked: Vec<VirtualServiceAllocation> = loads
        .iter()
        .map(|load| {
            let is_new = now - load.created_at < policy.new_service_window;
            let priority = if is_new {
                load.current_task_count - policy.new_service_boost
            } else {
                load.current_task_count
            };
            VirtualServiceAllocation {
                service_id: load.service_id,
                user_id: load.user_id,
                service_name: load.name.clone(),
                current_task_count: load.current_task_count,
                priority,
                is_new,
            }
        })
        .collect();
    ranked.sort_by_key(|a| (a.priority, a.service_id));
    ranked
}

/// Identity that receives the `index`-th task of a request.
pub fn round_robin(
    ranked: &[VirtualServiceAllocation],
    index: usize,
) -> Option<&VirtualServiceAllocation> {
    if ranked.is_empty() {
        None
    } else {
        ranked.get(index % ranked.len())
    }
}

// ---------------------------------------------------------------------------
// Relative-average allocation (estimation only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedShare {
    pub service_id: DbId,
    pub service_name: String,
    pub weight: i64,
    pub amount: Money,
}

/// Weight of one identity: `max(1, 100 - count)`, doubled when new.
pub fn service_weight(allocation: &VirtualServiceAllocation) -> i64 {
    let base = (WEIGHT_BASE - allocation.current_task_count).max(1);
    if allocation.is_new {
        base * 2
    } else {
        base
    }
}

/// Split `total` proportionally to identity weight.
///
/// Shares below the minimum task value are dropped; whatever is left after
/// rounding and dropping goes to the highest-weight identity.
pub fn relative_average_allocation(
    total: Money,
    ranked: &[VirtualServiceAllocation],
) -> Vec<WeightedShare> {
    if total <= Decimal::ZERO || ranked.is_empty() {
        return Vec::new();
    }

    let weights: Vec<i64> = ranked.iter().map(service_weight).collect();
    let total_weight: i64 = weights.iter().sum();

    let mut shares: Vec<WeightedShare> = ranked
        .iter()
        .zip(&weights)
        .filter_map(|(allocation, &weight)| {
            let amount =
                round_money(total * Decimal::from(weight) / Decimal::from(total_weight));
            (amount >= money(MIN_TASK_VALUE)).then(|| WeightedShare {
                service_id: allocation.service_id,
                service_name: allocation.service_name.clone(),
                weight,
                amount,
            })
        })
        .collect();

    let assigned: Money = shares.iter().map(|s| s.amount).sum();
    let leftover = total - assigned;
    if leftover != Decimal::ZERO {
        match max_weight_index(&shares) {
            Some(idx) => shares[idx].amount += leftover,
            None => {
                // Every share was too small; the heaviest identity takes all.
                let (idx, weight) = weights
                    .iter()
                    .copied()
                    .enumerate()
                    .fold((0, i64::MIN), |best, (i, w)| if w > best.1 { (i, w) } else { best });
                shares.push(WeightedShare {
                    service_id: ranked[idx].service_id,
                    service_name: ranked[idx].service_name.clone(),
                    weight,
                    amount: total,
                });
            }
        }
    }
    shares
}

fn max_weight_index(shares: &[WeightedShare]) -> Option<usize> {
    shares
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, i64)>, (i, s)| match best {
            Some((_, w)) if w >= s.weight => best,
            _ => Some((i, s.weight)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;

    fn load(id: DbId, count: i64, age_hours: i64, now: Timestamp) -> ServiceLoad {
        ServiceLoad {
            service_id: id,
            user_id: 1000 + id,
            name: format!("svc-{id}"),
            created_at: now - Duration::hours(age_hours),
            current_task_count: count,
        }
    }

    #[test]
    fn rank_orders_by_load_then_id() {
        let now = Utc::now();
        let ranked = rank(
            &[load(3, 2, 48, now), load(1, 5, 48, now), load(2, 2, 48, now)],
            now,
            &PriorityPolicy::default(),
        );
        let ids: Vec<_> = ranked.iter().map(|a| a.service_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn new_identity_sorts_first() {
        let now = Utc::now();
        let ranked = rank(
            &[load(1, 0, 48, now), load(2, 0, 48, now), load(9, 40, 1, now)],
            now,
            &PriorityPolicy::default(),
        );
        assert_eq!(ranked[0].service_id, 9);
        assert!(ranked[0].is_new);
        assert_eq!(ranked[0].priority, 40 - NEW_SERVICE_PRIORITY_BOOST);
    }

    #[test]
    fn identity_older_than_window_is_not_new() {
        let now = Utc::now();
        let ranked = rank(&[load(1, 0, 24, now)], now, &PriorityPolicy::default());
        assert!(!ranked[0].is_new);
    }

    #[test]
    fn round_robin_is_fair() {
        let now = Utc::now();
        let loads: Vec<_> = (1..=4).map(|id| load(id, 3, 72, now)).collect();
        let ranked = rank(&loads, now, &PriorityPolicy::default());

        for m in [0usize, 3, 4, 9, 17] {
            let mut counts: HashMap<DbId, usize> = HashMap::new();
            for i in 0..m {
                let a = round_robin(&ranked, i).expect("identity");
                *counts.entry(a.service_id).or_default() += 1;
            }
            for id in 1..=4 {
                let c = counts.get(&id).copied().unwrap_or(0);
                assert!(c == m / 4 || c == m.div_ceil(4), "m={m} id={id} c={c}");
            }
        }
    }

    #[test]
    fn round_robin_on_empty_list_is_none() {
        assert!(round_robin(&[], 0).is_none());
    }

    #[test]
    fn weight_formula() {
        let now = Utc::now();
        let ranked = rank(
            &[load(1, 30, 48, now), load(2, 150, 48, now), load(3, 10, 2, now)],
            now,
            &PriorityPolicy::default(),
        );
        let weights: HashMap<_, _> = ranked
            .iter()
            .map(|a| (a.service_id, service_weight(a)))
            .collect();
        assert_eq!(weights[&1], 70);
        assert_eq!(weights[&2], 1);
        assert_eq!(weights[&3], 180);
    }

    #[test]
    fn relative_average_conserves_total() {
        let now = Utc::now();
        let ranked = rank(
            &[load(1, 0, 48, now), load(2, 50, 48, now), load(3, 99, 48, now)],
            now,
            &PriorityPolicy::default(),
        );
        let shares = relative_average_allocation(money(100), &ranked);
        let sum: Money = shares.iter().map(|s| s.amount).sum();
        assert_eq!(sum, money(100));
        // weight 1 of 151 is below the minimum share and is dropped
        assert!(shares.iter().all(|s| s.service_id != 3));
        let heaviest = shares.iter().max_by_key(|s| s.weight).expect("share");
        assert_eq!(heaviest.service_id, 1);
    }

    #[test]
    fn relative_average_small_total_goes_to_heaviest() {
        let now = Utc::now();
        let ranked = rank(
            &[load(1, 0, 48, now), load(2, 0, 2, now), load(3, 0, 48, now)],
            now,
            &PriorityPolicy::default(),
        );
        let shares = relative_average_allocation(money(6), &ranked);
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].service_id, 2);
        assert_eq!(shares[0].amount, money(6));
    }

    #[test]
    fn relative_average_of_nothing_is_empty() {
        assert!(relative_average_allocation(money(100), &[]).is_empty());
        let now = Utc::now();
        let ranked = rank(&[load(1, 0, 48, now)], now, &PriorityPolicy::default());
        assert!(relative_average_allocation(Decimal::ZERO, &ranked).is_empty());
    }
}
