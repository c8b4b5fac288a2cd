//! Event type names published on the engine's event bus.

/// A task was accepted and persisted as `Pending`.
pub const TASK_SUBMITTED: &str = "task.submitted";

/// A worker claimed the task and started its handler.
pub const TASK_STARTED: &str = "task.started";

/// The handler succeeded.
pub const TASK_COMPLETED: &str = "task.completed";

/// The attempt failed and a retry is scheduled.
pub const TASK_RETRYING: &str = "task.retrying";

/// The task reached terminal failure.
pub const TASK_FAILED: &str = "task.failed";

/// A caller cancelled the running task.
pub const TASK_CANCELLED: &str = "task.cancelled";
