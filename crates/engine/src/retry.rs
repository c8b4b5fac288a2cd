//! Outcome handling for finished executions.
//!
//! [`RetryController`] is the only code that moves a task out of `Running`
//! into `Completed`, `Retrying` or `Failed`, and the only code that puts a
//! retried task back on the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskforge_core::retry::{RetryDecision, TaskFailure};
use taskforge_core::store::StoreError;
use taskforge_core::task::{Task, TaskStatus, TaskUpdate};
use taskforge_core::task_events::{
    TASK_CANCELLED, TASK_COMPLETED, TASK_FAILED, TASK_RETRYING,
};
use taskforge_core::types::{Payload, TaskId};

use crate::events::TaskEvent;
use crate::persist;
use crate::state::{EngineState, RuntimeHandle};

/// Upper bound on the pause between re-drives of a cancellation write.
const MAX_REDRIVE_DELAY: Duration = Duration::from_secs(30);

/// Lower bound, so a zero store retry delay does not spin.
const MIN_REDRIVE_DELAY: Duration = Duration::from_millis(10);

#[derive(Clone)]
pub(crate) struct RetryController {
    state: Arc<EngineState>,
}

impl RetryController {
    pub fn new(state: Arc<EngineState>) -> Self {
        Self { state }
    }

    /// Record a successful execution.
    pub async fn complete(&self, task: &Task, result: Payload) {
        let update = TaskUpdate::to(TaskStatus::Completed)
            .result(result)
            .completed_at(Utc::now());
        match persist::transition(&self.state, "complete", task.id, &[TaskStatus::Running], update)
            .await
        {
            Ok(Some(done)) => {
                self.state.counters.record_completed();
                tracing::info!(
                    task_id = %done.id,
                    task_type = %done.task_type,
                    attempt = done.retry_count,
                    "Task completed"
                );
                self.state.publish(TaskEvent::new(TASK_COMPLETED, &done));
            }
            Ok(None) => {
                tracing::debug!(task_id = %task.id, "Task left Running before completion was recorded");
            }
            Err(_) => {}
        }
    }

    /// Decide between a scheduled retry and a terminal failure.
    pub async fn on_failure(&self, task: &Task, failure: TaskFailure, runtime: &RuntimeHandle) {
        match self.state.config.retry.decide(task, &failure) {
            RetryDecision::Fail => {
                // A give-up is already logged and counted by `persist`.
                let _ = self.fail(task.id, &[TaskStatus::Running], &failure).await;
            }
            RetryDecision::Retry { delay, retry_count } => {
                self.schedule_retry(task, &failure, delay, retry_count, runtime)
                    .await;
            }
        }
    }

    async fn schedule_retry(
        &self,
        task: &Task,
        failure: &TaskFailure,
        delay: Duration,
        retry_count: u32,
        runtime: &RuntimeHandle,
    ) {
        let update = TaskUpdate::to(TaskStatus::Retrying)
            .retry_count(retry_count)
            .error(failure.to_string());
        let retrying = match persist::transition(
            &self.state,
            "retry",
            task.id,
            &[TaskStatus::Running],
            update,
        )
        .await
        {
            Ok(Some(retrying)) => retrying,
            Ok(None) | Err(_) => return,
        };

        self.state.counters.record_retried();
        tracing::warn!(
            task_id = %task.id,
            task_type = %task.task_type,
            retry_count,
            max_retries = task.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Task failed, retry scheduled"
        );
        self.state.publish(
            TaskEvent::new(TASK_RETRYING, &retrying)
                .with_detail(format!("retry in {}ms: {failure}", delay.as_millis())),
        );

        // The timer does not hold a worker slot. If shutdown wins, the task
        // stays `Retrying` and startup recovery re-enqueues it.
        let controller = self.clone();
        let shutdown = runtime.shutdown.clone();
        let (task_id, priority) = (task.id, task.priority);
        runtime.tracker.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(%task_id, "Retry timer dropped by shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    controller
                        .requeue(task_id, TaskStatus::Retrying, priority, "requeue")
                        .await;
                }
            }
        });
    }

    /// Move a task from `from` back to `Pending` and put it on the queue.
    pub async fn requeue(
        &self,
        task_id: TaskId,
        from: TaskStatus,
        priority: i32,
        operation: &'static str,
    ) -> bool {
        let update = TaskUpdate::to(TaskStatus::Pending);
        match persist::transition(&self.state, operation, task_id, &[from], update).await {
            Ok(Some(_)) => {
                self.state.queue.enqueue(task_id, priority).await;
                tracing::debug!(%task_id, priority, %from, "Task re-enqueued");
                true
            }
            Ok(None) | Err(_) => false,
        }
    }

    /// Fail a task that could never be claimed (no handler registered).
    pub async fn fail_unclaimed(&self, task_id: TaskId, failure: TaskFailure) {
        let _ = self.fail(task_id, &[TaskStatus::Pending], &failure).await;
    }

    /// Record an explicit cancellation of a running task.
    ///
    /// `Ok(false)` means the task had already left `Running`.
    pub async fn cancel(&self, task_id: TaskId) -> Result<bool, StoreError> {
        self.fail(task_id, &[TaskStatus::Running], &TaskFailure::Cancelled)
            .await
    }

    /// Keep retrying a cancellation write that [`cancel`](Self::cancel)
    /// could not persist.
    ///
    /// Stops once the write lands, the task leaves `Running` some other
    /// way, or the engine shuts down. In the last case the task stays
    /// `Running` and startup recovery picks it up.
    pub fn redrive_cancel(&self, task_id: TaskId, runtime: &RuntimeHandle) {
        let controller = self.clone();
        let shutdown = runtime.shutdown.clone();
        let mut delay = self.state.config.store_retry_delay.max(MIN_REDRIVE_DELAY);
        runtime.tracker.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::warn!(%task_id, "Cancellation not recorded before shutdown");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                match controller.cancel(task_id).await {
                    Ok(_) => return,
                    Err(_) => delay = delay.saturating_mul(2).min(MAX_REDRIVE_DELAY),
                }
            }
        });
    }

    /// Move a task to `Failed` if it is still in one of `expected`.
    ///
    /// Returns whether this call recorded the failure.
    async fn fail(
        &self,
        task_id: TaskId,
        expected: &[TaskStatus],
        failure: &TaskFailure,
    ) -> Result<bool, StoreError> {
        let cancelled = matches!(failure, TaskFailure::Cancelled);
        let update = TaskUpdate::to(TaskStatus::Failed)
            .error(failure.to_string())
            .completed_at(Utc::now());
        let Some(failed) =
            persist::transition(&self.state, "fail", task_id, expected, update).await?
        else {
            return Ok(false);
        };

        self.state.counters.record_failed();
        let error = failed.error_message.as_deref().unwrap_or_default();
        if cancelled {
            tracing::info!(%task_id, task_type = %failed.task_type, "Task cancelled");
        } else {
            tracing::error!(
                %task_id,
                task_type = %failed.task_type,
                retry_count = failed.retry_count,
                error,
                "Task failed"
            );
        }
        let event_type = if cancelled { TASK_CANCELLED } else { TASK_FAILED };
        self.state
            .publish(TaskEvent::new(event_type, &failed).with_detail(error));
        Ok(true)
    }
}
