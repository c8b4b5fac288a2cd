//! Worker loops.
//!
//! Each worker dequeues a task id, claims the task in the store with a
//! compare-and-set (`Pending -> Running`), runs its handler in a separate
//! tokio task bounded by a timeout, and hands the outcome to the
//! [`RetryController`].

use std::sync::Arc;

use chrono::Utc;
use taskforge_core::retry::TaskFailure;
use taskforge_core::task::{Task, TaskStatus, TaskUpdate};
use taskforge_core::task_events::TASK_STARTED;
use taskforge_core::types::Payload;
use tokio_util::sync::CancellationToken;

use crate::events::TaskEvent;
use crate::persist;
use crate::queue::QueueEntry;
use crate::registry::{RegisteredHandler, TaskContext};
use crate::retry::RetryController;
use crate::state::{EngineState, RuntimeHandle};

/// Error message recorded when a handler panics.
pub const PANIC_MESSAGE: &str = "handler panicked";

/// How one execution ended.
#[derive(Debug)]
enum Outcome {
    Succeeded(Payload),
    Failed(TaskFailure),
    /// The task's token fired because the engine is shutting down.
    Interrupted,
}

/// Spawn `worker_count` (at least one) worker loops on the runtime tracker.
pub(crate) fn spawn_workers(
    state: &Arc<EngineState>,
    retry: &RetryController,
    runtime: &RuntimeHandle,
) -> usize {
    let count = state.config.worker_count.max(1);
    for id in 0..count {
        let worker = Worker {
            id,
            state: Arc::clone(state),
            retry: retry.clone(),
            runtime: runtime.clone(),
        };
        runtime.tracker.spawn(worker.run());
    }
    count
}

struct Worker {
    id: usize,
    state: Arc<EngineState>,
    retry: RetryController,
    runtime: RuntimeHandle,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker = self.id, "Worker started");
        let poll = self.state.config.dequeue_poll_interval;
        while let Some(entry) = self.state.queue.dequeue(&self.runtime.shutdown, poll).await {
            self.process(entry).await;
        }
        tracing::debug!(worker = self.id, "Worker stopped");
    }

    async fn process(&self, entry: QueueEntry) {
        let task = match persist::load(&self.state, entry.task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::debug!(worker = self.id, task_id = %entry.task_id, "Queued task no longer exists");
                return;
            }
            Err(_) => {
                self.state.queue.enqueue(entry.task_id, entry.priority).await;
                return;
            }
        };
        if task.status != TaskStatus::Pending {
            tracing::debug!(
                worker = self.id,
                task_id = %task.id,
                status = %task.status,
                "Skipping task that is not pending"
            );
            return;
        }

        let Some(registered) = self.state.registry.resolve(&task.task_type).await else {
            tracing::warn!(
                worker = self.id,
                task_id = %task.id,
                task_type = %task.task_type,
                "No handler registered for task type"
            );
            self.retry
                .fail_unclaimed(task.id, TaskFailure::UnknownTaskType(task.task_type.clone()))
                .await;
            return;
        };

        let claim = TaskUpdate::to(TaskStatus::Running).started_at(Utc::now());
        let task = match persist::transition(
            &self.state,
            "claim",
            task.id,
            &[TaskStatus::Pending],
            claim,
        )
        .await
        {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::debug!(worker = self.id, task_id = %task.id, "Task claimed elsewhere");
                return;
            }
            Err(_) => {
                self.state.queue.enqueue(task.id, task.priority).await;
                return;
            }
        };

        let token = self.runtime.shutdown.child_token();
        self.state.running.insert(task.id, token.clone());
        tracing::info!(
            worker = self.id,
            task_id = %task.id,
            task_type = %task.task_type,
            attempt = task.retry_count,
            "Task started"
        );
        self.state.publish(TaskEvent::new(TASK_STARTED, &task));

        let outcome = self.execute(&task, registered, token).await;

        // Cancel removes the entry before firing the token and records the
        // failure itself.
        if self.state.running.remove(&task.id).is_none() {
            tracing::debug!(worker = self.id, task_id = %task.id, "Task was cancelled");
            return;
        }

        match outcome {
            Outcome::Succeeded(result) => self.retry.complete(&task, result).await,
            Outcome::Failed(failure) => {
                self.retry.on_failure(&task, failure, &self.runtime).await;
            }
            Outcome::Interrupted => {
                tracing::info!(worker = self.id, task_id = %task.id, "Task interrupted by shutdown");
                self.retry
                    .requeue(task.id, TaskStatus::Running, task.priority, "hand_back")
                    .await;
            }
        }
    }

    async fn execute(
        &self,
        task: &Task,
        registered: RegisteredHandler,
        token: CancellationToken,
    ) -> Outcome {
        let timeout = registered.timeout.unwrap_or(self.state.config.task_timeout);
        let ctx = TaskContext::new(
            task.id,
            task.session_id.clone(),
            task.task_type.clone(),
            task.retry_count,
            token.clone(),
        );
        let handler = registered.handler;
        let payload = task.payload.clone();
        let mut handle = tokio::spawn(async move { handler.handle(ctx, payload).await });

        let outcome = tokio::select! {
            joined = tokio::time::timeout(timeout, &mut handle) => match joined {
                Ok(Ok(Ok(result))) => Outcome::Succeeded(result),
                Ok(Ok(Err(e))) => Outcome::Failed(TaskFailure::Handler(format!("{e:#}"))),
                Ok(Err(e)) if e.is_panic() => {
                    tracing::error!(task_id = %task.id, task_type = %task.task_type, "Handler panicked");
                    Outcome::Failed(TaskFailure::Handler(PANIC_MESSAGE.to_string()))
                }
                Ok(Err(_)) => Outcome::Interrupted,
                Err(_) => Outcome::Failed(TaskFailure::Timeout(timeout)),
            },
            _ = token.cancelled() => Outcome::Interrupted,
        };

        if !handle.is_finished() {
            handle.abort();
        }

        // A handler that noticed the token and bailed out with an error has
        // not really failed.
        match outcome {
            Outcome::Failed(_) if token.is_cancelled() => Outcome::Interrupted,
            other => other,
        }
    }
}
