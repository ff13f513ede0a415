//! Pure rules for completing and expiring tasks.

use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::task::{state_machine, TaskRecord, TaskStatus};
use crate::types::{DbId, Money, Timestamp};

/// Check that `task` may be settled as completed.
pub fn ensure_completable(task: &TaskRecord) -> Result<(), CoreError> {
    if !task.is_virtual {
        return Err(CoreError::Validation(format!(
            "Task {} is not a virtual task",
            task.id
        )));
    }
    if task.status.is_terminal() || task.value_recycled {
        return Err(CoreError::InvalidState(format!(
            "Task {} is already {}",
            task.id,
            task.status.label()
        )));
    }
    state_machine::validate_transition(task.status, TaskStatus::Completed)
        .map_err(CoreError::InvalidState)
}

/// What the expiry sweep does with one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    /// Unaccepted past its deadline: delete and return its face value.
    Delete,
    /// Terminated without its value returned yet: keep the row, return value.
    Recycle,
}

pub fn expiry_action(task: &TaskRecord, now: Timestamp) -> Option<ExpiryAction> {
    match task.status {
        TaskStatus::Unaccepted if task.end_date <= now => Some(ExpiryAction::Delete),
        TaskStatus::Terminated if !task.value_recycled => Some(ExpiryAction::Recycle),
        _ => None,
    }
}

/// Expired tasks of one owner, partitioned by action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpiryBatch {
    pub delete_ids: Vec<DbId>,
    pub recycle_ids: Vec<DbId>,
    /// Face value of every task in the batch.
    pub returned_value: Money,
}

impl ExpiryBatch {
    pub fn collect<'a>(tasks: impl IntoIterator<Item = &'a TaskRecord>, now: Timestamp) -> Self {
        let mut batch = Self {
            returned_value: Decimal::ZERO,
            ..Self::default()
        };
        for task in tasks {
            match expiry_action(task, now) {
                Some(ExpiryAction::Delete) => batch.delete_ids.push(task.id),
                Some(ExpiryAction::Recycle) => batch.recycle_ids.push(task.id),
                None => continue,
            }
            batch.returned_value += task.commission;
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.delete_ids.is_empty() && self.recycle_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.delete_ids.len() + self.recycle_ids.len()
    }
}
