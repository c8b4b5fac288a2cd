//! The task record: immutable identity plus mutable lifecycle state.
//!
//! A [`Task`] is created `Pending` by the orchestrator and mutated only
//! through [`TaskUpdate`]s applied by a [`crate::store::TaskStore`].

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{Payload, TaskId, Timestamp};

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retrying,
}

impl TaskStatus {
    /// Statuses from which no further automatic transition occurs.
    pub const TERMINAL: [TaskStatus; 2] = [TaskStatus::Completed, TaskStatus::Failed];

    /// Statuses a task may be left in when the engine stops.
    pub const RECOVERABLE: [TaskStatus; 3] =
        [TaskStatus::Pending, TaskStatus::Running, TaskStatus::Retrying];

    /// Storage representation (lowercase).
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
        }
    }

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "retrying" => Ok(TaskStatus::Retrying),
            other => Err(CoreError::Validation(format!(
                "Unknown task status: \"{other}\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One unit of schedulable background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Caller-supplied correlation key; never interpreted by the engine.
    pub session_id: String,
    pub task_type: String,
    pub status: TaskStatus,
    /// Higher value is dequeued first.
    pub priority: i32,
    pub payload: Payload,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    /// Set only on `Completed`.
    pub result: Option<Payload>,
}

impl Task {
    /// Build a fresh `Pending` task with a newly generated id.
    pub fn new(input: NewTask) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            session_id: input.session_id,
            task_type: input.task_type,
            status: TaskStatus::Pending,
            priority: input.priority,
            payload: input.payload,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: input.max_retries,
            error_message: None,
            result: None,
        }
    }

    /// Whether another failed attempt may still be retried.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Apply an update in memory, honouring the set-once timestamps.
    ///
    /// Stores that keep records in memory use this so that their
    /// semantics match the SQL implementation.
    pub fn apply(&mut self, update: &TaskUpdate) {
        self.status = update.status;
        if self.started_at.is_none() {
            self.started_at = update.started_at;
        }
        if self.completed_at.is_none() {
            self.completed_at = update.completed_at;
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(result) = &update.result {
            self.result = Some(result.clone());
        }
        if let Some(count) = update.retry_count {
            self.retry_count = count;
        }
    }
}

/// Largest accepted `max_retries`; counters are stored as signed 32-bit
/// integers.
pub const MAX_RETRIES_LIMIT: u32 = i32::MAX as u32;

/// Input for [`Task::new`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub task_type: String,
    pub session_id: String,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub max_retries: u32,
}

fn default_priority() -> i32 {
    crate::scheduling::PRIORITY_NORMAL
}

impl NewTask {
    /// Reject submissions the engine could never run.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.task_type.trim().is_empty() {
            return Err(CoreError::Validation(
                "Task type must not be empty".to_string(),
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(CoreError::Validation(format!(
                "max_retries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TaskUpdate
// ---------------------------------------------------------------------------

/// A status transition plus the fields that change with it.
///
/// `None` fields are left untouched. `started_at` and `completed_at` are
/// only written when the stored value is still unset.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUpdate {
    pub status: TaskStatus,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub result: Option<Payload>,
    pub retry_count: Option<u32>,
}

impl TaskUpdate {
    pub fn to(status: TaskStatus) -> Self {
        Self {
            status,
            started_at: None,
            completed_at: None,
            error_message: None,
            result: None,
            retry_count: None,
        }
    }

    pub fn started_at(mut self, at: Timestamp) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: Timestamp) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn result(mut self, result: Payload) -> Self {
        self.result = Some(result);
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }
}
