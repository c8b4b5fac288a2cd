//! Task storage contract.
//!
//! The store is the single source of truth for task state. Engine code
//! holds task records only transiently while an execution is active.

mod memory;

use async_trait::async_trait;

use crate::task::{Task, TaskStatus, TaskUpdate};
use crate::types::{TaskId, Timestamp};

pub use memory::MemoryTaskStore;

/// Error type for task store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached. Transient.
    #[error("task store unavailable: {0}")]
    Unavailable(String),

    /// A task with this id already exists.
    #[error("task {0} already exists")]
    Duplicate(TaskId),

    /// A stored record could not be decoded.
    #[error("corrupt task record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Durable record of task state.
///
/// Implementations must be safe for concurrent use by many workers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task.
    async fn create(&self, task: &Task) -> Result<(), StoreError>;

    /// Load a task by id.
    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// Atomically apply `update` if the task's current status is one of
    /// `expected` and the transition is allowed by the state machine.
    ///
    /// Returns the updated record, or `None` when the task is missing or the
    /// precondition did not hold. Callers rely on this compare-and-set to
    /// make sure only one worker ever owns a task.
    async fn update_status(
        &self,
        id: TaskId,
        expected: &[TaskStatus],
        update: &TaskUpdate,
    ) -> Result<Option<Task>, StoreError>;

    /// All tasks for a session, newest first.
    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Task>, StoreError>;

    /// All tasks currently in one of `statuses`, oldest first.
    async fn list_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>, StoreError>;

    /// Delete tasks in one of `statuses` whose `completed_at` is before
    /// `cutoff`. Returns the number of deleted records.
    async fn delete_older_than(
        &self,
        cutoff: Timestamp,
        statuses: &[TaskStatus],
    ) -> Result<u64, StoreError>;
}
