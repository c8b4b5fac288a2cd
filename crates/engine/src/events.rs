//! In-process lifecycle notifications backed by a `tokio::sync::broadcast`
//! channel.
//!
//! Events are advisory: the task store stays authoritative, and a slow
//! subscriber observes `RecvError::Lagged` rather than blocking workers.

use serde::{Deserialize, Serialize};
use taskforge_core::task::{Task, TaskStatus};
use taskforge_core::types::{TaskId, Timestamp};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// TaskEvent
// ---------------------------------------------------------------------------

/// A task lifecycle change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// One of the `taskforge_core::task_events` constants.
    pub event_type: String,
    pub task_id: TaskId,
    pub task_type: String,
    pub session_id: String,
    /// Status after the change.
    pub status: TaskStatus,
    /// Error text or retry delay, when relevant.
    pub detail: Option<String>,
    pub timestamp: Timestamp,
}

impl TaskEvent {
    pub fn new(event_type: impl Into<String>, task: &Task) -> Self {
        Self {
            event_type: event_type.into(),
            task_id: task.id,
            task_type: task.task_type.clone(),
            session_id: task.session_id.clone(),
            status: task.status,
            detail: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus; every subscriber sees every event published after it
/// subscribed.
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped if there are none.
    pub fn publish(&self, event: TaskEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
