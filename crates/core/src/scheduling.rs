//! Task priority constants and state machine.
//!
//! Lives in `core` so both the store implementations and the engine agree
//! on which status transitions exist.

use crate::error::CoreError;
use crate::task::TaskStatus;

// ---------------------------------------------------------------------------
// Priority constants
// ---------------------------------------------------------------------------

/// Priority for work that can wait behind everything else.
pub const PRIORITY_LOW: i32 = 1;

/// Priority for normal tasks. Default.
pub const PRIORITY_NORMAL: i32 = 2;

/// Priority for user-facing tasks that should jump the normal backlog.
pub const PRIORITY_HIGH: i32 = 3;

/// Priority for tasks dispatched before all others.
pub const PRIORITY_CRITICAL: i32 = 4;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::*;

    /// Returns the statuses reachable from `from`.
    ///
    /// - `Pending -> Failed` only happens for tasks whose type has no handler.
    /// - `Running -> Pending` hands a task back when the engine stops while
    ///   its handler is still in flight.
    /// - Terminal states return an empty slice.
    pub fn valid_transitions(from: TaskStatus) -> &'static [TaskStatus] {
        match from {
            TaskStatus::Pending => &[TaskStatus::Running, TaskStatus::Failed],
            TaskStatus::Running => &[
                TaskStatus::Completed,
                TaskStatus::Retrying,
                TaskStatus::Failed,
                TaskStatus::Pending,
            ],
            TaskStatus::Retrying => &[TaskStatus::Pending],
            TaskStatus::Completed | TaskStatus::Failed => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: TaskStatus, to: TaskStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning a conflict error for invalid ones.
    pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Invalid transition: {from} -> {to}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;
    use super::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_running() {
        assert!(can_transition(TaskStatus::Pending, TaskStatus::Running));
    }

    #[test]
    fn pending_to_failed() {
        assert!(can_transition(TaskStatus::Pending, TaskStatus::Failed));
    }

    #[test]
    fn running_to_completed() {
        assert!(can_transition(TaskStatus::Running, TaskStatus::Completed));
    }

    #[test]
    fn running_to_retrying() {
        assert!(can_transition(TaskStatus::Running, TaskStatus::Retrying));
    }

    #[test]
    fn running_to_failed() {
        assert!(can_transition(TaskStatus::Running, TaskStatus::Failed));
    }

    #[test]
    fn running_back_to_pending() {
        assert!(can_transition(TaskStatus::Running, TaskStatus::Pending));
    }

    #[test]
    fn retrying_to_pending() {
        assert!(can_transition(TaskStatus::Retrying, TaskStatus::Pending));
    }

    // -----------------------------------------------------------------------
    // Terminal states have no outgoing transitions
    // -----------------------------------------------------------------------

    #[test]
    fn completed_has_no_transitions() {
        assert!(valid_transitions(TaskStatus::Completed).is_empty());
    }

    #[test]
    fn failed_has_no_transitions() {
        assert!(valid_transitions(TaskStatus::Failed).is_empty());
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn pending_to_completed_invalid() {
        assert!(!can_transition(TaskStatus::Pending, TaskStatus::Completed));
    }

    #[test]
    fn retrying_to_running_invalid() {
        assert!(!can_transition(TaskStatus::Retrying, TaskStatus::Running));
    }

    #[test]
    fn failed_to_pending_invalid() {
        assert!(!can_transition(TaskStatus::Failed, TaskStatus::Pending));
    }

    #[test]
    fn validate_transition_err_names_both_states() {
        let err = validate_transition(TaskStatus::Completed, TaskStatus::Running).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("running"));
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(PRIORITY_LOW < PRIORITY_NORMAL);
        assert!(PRIORITY_NORMAL < PRIORITY_HIGH);
        assert!(PRIORITY_HIGH < PRIORITY_CRITICAL);
    }
}
