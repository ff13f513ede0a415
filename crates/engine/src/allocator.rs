//! Virtual-service allocation: turns face values into persisted tasks.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use vorder_core::allocation::{
    rank, relative_average_allocation, round_robin, service_weight, VirtualServiceAllocation,
    WeightedShare,
};
use vorder_core::content::{ContentGenerator, TaskContent};
use vorder_core::error::CoreError;
use vorder_core::store::StoreTx;
use vorder_core::task::{NewTask, TaskRecord};
use vorder_core::types::{DbId, Money, Timestamp};

use crate::{EngineResult, VirtualOrderEngine};

/// Who a batch of tasks is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTarget {
    /// Personal tasks funded by the student's subsidy pool.
    Student(DbId),
    /// Shared tasks funded by the bonus pool of the given date.
    BonusPool(NaiveDate),
}

/// Result of one allocation request.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcome {
    pub tasks: Vec<TaskRecord>,
    /// Face value actually turned into tasks.
    pub generated_amount: Money,
    /// Units skipped because no image could be reserved.
    pub shortfall_count: usize,
    pub shortfall_amount: Money,
}

impl AllocationOutcome {
    pub fn empty() -> Self {
        Self {
            tasks: Vec::new(),
            generated_amount: Decimal::ZERO,
            shortfall_count: 0,
            shortfall_amount: Decimal::ZERO,
        }
    }
}

/// Identity ranking as reported to operators.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatistics {
    #[serde(flatten)]
    pub allocation: VirtualServiceAllocation,
    pub weight: i64,
    pub open_tasks: i64,
    pub open_amount: Money,
    pub completed_tasks: i64,
}

impl VirtualOrderEngine {
    /// Create one task per face value, spreading them round-robin over the
    /// identities ranked by current load.
    ///
    /// Units whose image cannot be reserved are skipped and reported. The
    /// call fails only when there is no identity at all or nothing could be
    /// created.
    pub(crate) async fn allocate(
        &self,
        tx: &mut dyn StoreTx,
        face_values: &[Money],
        target: TaskTarget,
        now: Timestamp,
    ) -> EngineResult<AllocationOutcome> {
        if face_values.is_empty() {
            return Ok(AllocationOutcome::empty());
        }

        let loads = tx.service_loads().await?;
        let ranked = rank(&loads, now, &self.config.priority);
        if ranked.is_empty() {
            return Err(
                CoreError::ResourceExhausted("No active virtual service identity".into()).into(),
            );
        }

        let generator = ContentGenerator::new(tx.active_categories().await?);
        let contents: Vec<TaskContent> = self.with_rng(|rng| {
            face_values.iter().map(|_| generator.generate(rng)).collect()
        });

        let mut outcome = AllocationOutcome::empty();
        for (&face_value, content) in face_values.iter().zip(contents) {
            let image = if self.config.require_images {
                match tx.reserve_image(content.category.as_deref()).await? {
                    Some(image) => Some(image),
                    None => {
                        outcome.shortfall_count += 1;
                        outcome.shortfall_amount += face_value;
                        continue;
                    }
                }
            } else {
                None
            };

            let Some(service) = round_robin(&ranked, outcome.tasks.len()) else {
                break;
            };
            let task = tx
                .insert_task(&self.new_task(content, face_value, target, service, now))
                .await?;
            if let Some(image) = image {
                tx.attach_image(image.id, task.id).await?;
            }
            outcome.generated_amount += face_value;
            outcome.tasks.push(task);
        }

        if outcome.shortfall_count > 0 {
            tracing::warn!(
                ?target,
                shortfall_count = outcome.shortfall_count,
                shortfall_amount = %outcome.shortfall_amount,
                "Image library exhausted, some tasks were not generated"
            );
        }
        if outcome.tasks.is_empty() {
            return Err(CoreError::ResourceExhausted(format!(
                "No image available for any of {} task(s)",
                face_values.len()
            ))
            .into());
        }

        tracing::debug!(
            ?target,
            created = outcome.tasks.len(),
            amount = %outcome.generated_amount,
            "Allocated virtual tasks"
        );
        Ok(outcome)
    }

    fn new_task(
        &self,
        content: TaskContent,
        face_value: Money,
        target: TaskTarget,
        service: &VirtualServiceAllocation,
        now: Timestamp,
    ) -> NewTask {
        let (target_student_id, bonus_pool_date) = match target {
            TaskTarget::Student(id) => (Some(id), None),
            TaskTarget::BonusPool(date) => (None, Some(date)),
        };
        NewTask {
            summary: content.summary,
            requirement: content.requirement,
            category: content.category,
            order_number: content.order_number,
            commission: face_value,
            target_student_id,
            is_bonus_pool: bonus_pool_date.is_some(),
            bonus_pool_date,
            founder_id: service.service_id,
            founder: service.service_name.clone(),
            end_date: now + self.config.accept_window,
            delivery_date: now + self.config.delivery_window,
        }
    }

    /// Current identity ranking with per-identity task totals.
    pub async fn allocation_statistics(&self) -> EngineResult<Vec<ServiceStatistics>> {
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let loads = tx.service_loads().await?;
        let totals = tx.founder_totals().await?;

        Ok(rank(&loads, now, &self.config.priority)
            .into_iter()
            .map(|allocation| {
                let found = totals.iter().find(|t| t.service_id == allocation.service_id);
                ServiceStatistics {
                    weight: service_weight(&allocation),
                    open_tasks: found.map_or(0, |t| t.open_tasks),
                    open_amount: found.map_or(Decimal::ZERO, |t| t.open_amount),
                    completed_tasks: found.map_or(0, |t| t.completed_tasks),
                    allocation,
                }
            })
            .collect())
    }

    /// How `amount` would be spread over the identities by weight.
    pub async fn estimate_distribution(&self, amount: Money) -> EngineResult<Vec<WeightedShare>> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::Validation("amount must be positive".into()).into());
        }
        let now = self.now();
        let mut tx = self.store.begin().await?;
        let loads = tx.service_loads().await?;
        let ranked = rank(&loads, now, &self.config.priority);
        Ok(relative_average_allocation(amount, &ranked))
    }
}
