//! Task records and the task status state machine.
//!
//! Statuses are persisted as the single-character codes `'0'..'5'`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Money, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Unaccepted,
    Accepted,
    InProgress,
    Submitted,
    Completed,
    Terminated,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Unaccepted,
        TaskStatus::Accepted,
        TaskStatus::InProgress,
        TaskStatus::Submitted,
        TaskStatus::Completed,
        TaskStatus::Terminated,
    ];

    /// Persisted status code.
    pub fn code(self) -> &'static str {
        match self {
            TaskStatus::Unaccepted => "0",
            TaskStatus::Accepted => "1",
            TaskStatus::InProgress => "2",
            TaskStatus::Submitted => "3",
            TaskStatus::Completed => "4",
            TaskStatus::Terminated => "5",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code.trim())
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Unaccepted => "unaccepted",
            TaskStatus::Accepted => "accepted",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Submitted => "submitted",
            TaskStatus::Completed => "completed",
            TaskStatus::Terminated => "terminated",
        }
    }

    /// Completed and terminated tasks never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Terminated)
    }

    /// Statuses counted as a virtual identity's current load.
    pub fn counts_toward_load(self) -> bool {
        matches!(
            self,
            TaskStatus::Unaccepted | TaskStatus::Accepted | TaskStatus::InProgress
        )
    }

    /// Accepted but not yet settled.
    pub fn is_claimed(self) -> bool {
        matches!(
            self,
            TaskStatus::Accepted | TaskStatus::InProgress | TaskStatus::Submitted
        )
    }
}

/// Task status transition rules.
pub mod state_machine {
    use super::TaskStatus;

    /// Statuses reachable from `from` in one step.
    pub fn valid_transitions(from: TaskStatus) -> &'static [TaskStatus] {
        match from {
            TaskStatus::Unaccepted => &[TaskStatus::Accepted, TaskStatus::Terminated],
            TaskStatus::Accepted => &[
                TaskStatus::InProgress,
                TaskStatus::Submitted,
                TaskStatus::Completed,
                TaskStatus::Terminated,
            ],
            TaskStatus::InProgress => &[
                TaskStatus::Submitted,
                TaskStatus::Completed,
                TaskStatus::Terminated,
            ],
            TaskStatus::Submitted => &[TaskStatus::Completed],
            TaskStatus::Completed | TaskStatus::Terminated => &[],
        }
    }

    pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Statuses from which `to` can be reached in one step.
    pub fn sources_of(to: TaskStatus) -> Vec<TaskStatus> {
        TaskStatus::ALL
            .into_iter()
            .filter(|from| can_transition(*from, to))
            .collect()
    }

    pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!(
                "Cannot move a task from {} to {}",
                from.label(),
                to.label()
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A persisted task as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: DbId,
    pub summary: String,
    pub requirement: String,
    pub category: Option<String>,
    pub order_number: String,
    /// Face value.
    pub commission: Money,
    pub status: TaskStatus,
    pub is_virtual: bool,
    /// `None` for open (bonus-pool) tasks.
    pub target_student_id: Option<DbId>,
    pub is_bonus_pool: bool,
    pub bonus_pool_date: Option<NaiveDate>,
    pub founder_id: Option<DbId>,
    pub founder: Option<String>,
    /// String-encoded acceptor id.
    pub accepted_by: Option<String>,
    pub accepted_at: Option<Timestamp>,
    pub submitted_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// Real payout recorded at completion.
    pub settled_income: Option<Money>,
    pub value_recycled: bool,
    pub end_date: Timestamp,
    pub delivery_date: Timestamp,
    pub created_at: Timestamp,
}

impl TaskRecord {
    /// Numeric acceptor id, if the task was accepted by a known student.
    pub fn acceptor_id(&self) -> Option<DbId> {
        self.accepted_by.as_deref()?.trim().parse().ok()
    }
}

/// Fields for a task about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub summary: String,
    pub requirement: String,
    pub category: Option<String>,
    pub order_number: String,
    pub commission: Money,
    pub target_student_id: Option<DbId>,
    pub is_bonus_pool: bool,
    pub bonus_pool_date: Option<NaiveDate>,
    pub founder_id: DbId,
    pub founder: String,
    pub end_date: Timestamp,
    pub delivery_date: Timestamp,
}

/// A conditional status change. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskChange {
    pub status: TaskStatus,
    pub accepted_by: Option<String>,
    pub accepted_at: Option<Timestamp>,
    pub submitted_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub settled_income: Option<Money>,
    pub value_recycled: Option<bool>,
}

impl TaskChange {
    pub fn to(status: TaskStatus) -> Self {
        Self {
            status,
            accepted_by: None,
            accepted_at: None,
            submitted_at: None,
            completed_at: None,
            settled_income: None,
            value_recycled: None,
        }
    }

    pub fn accept(student_id: DbId, at: Timestamp) -> Self {
        Self {
            accepted_by: Some(student_id.to_string()),
            accepted_at: Some(at),
            ..Self::to(TaskStatus::Accepted)
        }
    }

    pub fn submit(at: Timestamp) -> Self {
        Self {
            submitted_at: Some(at),
            ..Self::to(TaskStatus::Submitted)
        }
    }

    /// Completion also stamps `value_recycled` so the payout is never
    /// processed twice.
    pub fn complete(income: Money, at: Timestamp) -> Self {
        Self {
            completed_at: Some(at),
            settled_income: Some(income),
            value_recycled: Some(true),
            ..Self::to(TaskStatus::Completed)
        }
    }

    /// Apply the change to an in-memory record.
    pub fn apply(&self, task: &mut TaskRecord) {
        task.status = self.status;
        if let Some(by) = &self.accepted_by {
            task.accepted_by = Some(by.clone());
        }
        if let Some(at) = self.accepted_at {
            task.accepted_at = Some(at);
        }
        if let Some(at) = self.submitted_at {
            task.submitted_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            task.completed_at = Some(at);
        }
        if let Some(income) = self.settled_income {
            task.settled_income = Some(income);
        }
        if let Some(recycled) = self.value_recycled {
            task.value_recycled = recycled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;
    use super::*;

    #[test]
    fn codes_round_trip() {
        for status in TaskStatus::ALL {
            assert_eq!(TaskStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(TaskStatus::from_code("9"), None);
        assert_eq!(TaskStatus::from_code(" 3 "), Some(TaskStatus::Submitted));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        assert!(valid_transitions(TaskStatus::Completed).is_empty());
        assert!(valid_transitions(TaskStatus::Terminated).is_empty());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(!TaskStatus::Submitted.is_terminal());
    }

    #[test]
    fn happy_path_is_valid() {
        assert!(can_transition(TaskStatus::Unaccepted, TaskStatus::Accepted));
        assert!(can_transition(TaskStatus::Accepted, TaskStatus::InProgress));
        assert!(can_transition(TaskStatus::InProgress, TaskStatus::Submitted));
        assert!(can_transition(TaskStatus::Submitted, TaskStatus::Completed));
    }

    #[test]
    fn unaccepted_cannot_complete() {
        assert!(validate_transition(TaskStatus::Unaccepted, TaskStatus::Completed).is_err());
    }

    #[test]
    fn submitted_cannot_be_terminated() {
        assert!(!can_transition(TaskStatus::Submitted, TaskStatus::Terminated));
    }

    #[test]
    fn completion_sources() {
        assert_eq!(
            sources_of(TaskStatus::Completed),
            vec![
                TaskStatus::Accepted,
                TaskStatus::InProgress,
                TaskStatus::Submitted
            ]
        );
    }

    #[test]
    fn load_counts_only_open_work() {
        let load: Vec<_> = TaskStatus::ALL
            .into_iter()
            .filter(|s| s.counts_toward_load())
            .collect();
        assert_eq!(
            load,
            vec![
                TaskStatus::Unaccepted,
                TaskStatus::Accepted,
                TaskStatus::InProgress
            ]
        );
    }

    #[test]
    fn complete_change_stamps_recycled() {
        let change = TaskChange::complete(rust_decimal::Decimal::from(12), chrono::Utc::now());
        assert_eq!(change.status, TaskStatus::Completed);
        assert_eq!(change.value_recycled, Some(true));
    }
}
