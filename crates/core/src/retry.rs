//! Failure taxonomy and retry/backoff policy.
//!
//! [`RetryPolicy::decide`] is the only place that turns a failed attempt
//! into either a delayed retry or a terminal failure.

use std::time::Duration;

use crate::task::Task;

/// Default delay before the first retry.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(2);

/// Upper bound on the delay between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Error message recorded for cancelled tasks.
pub const CANCELLED_MESSAGE: &str = "cancelled";

// ---------------------------------------------------------------------------
// TaskFailure
// ---------------------------------------------------------------------------

/// Why one execution attempt of a task did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskFailure {
    /// No handler registered for the task type. Never retried.
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    /// The handler returned an error (or panicked).
    #[error("{0}")]
    Handler(String),

    /// The handler did not finish within its allotted time.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Explicit cancellation by a caller. Never retried.
    #[error("cancelled")]
    Cancelled,
}

impl TaskFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskFailure::Handler(_) | TaskFailure::Timeout(_))
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Outcome of [`RetryPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue after `delay`; the task's counter becomes `retry_count`.
    Retry { delay: Duration, retry_count: u32 },
    /// Mark the task `Failed`.
    Fail,
}

/// Tunable parameters for exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_RETRY_BASE,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows a failure at `retry_count`.
    ///
    /// `min(max_backoff, base * 2^retry_count)`, saturating on overflow.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Decide what happens to `task` after a failed attempt.
    pub fn decide(&self, task: &Task, failure: &TaskFailure) -> RetryDecision {
        if !failure.is_retryable() || !task.has_retries_left() {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry {
            delay: self.backoff(task.retry_count),
            retry_count: task.retry_count + 1,
        }
    }
}
