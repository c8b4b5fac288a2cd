//! Top-level engine object.
//!
//! [`Orchestrator`] wires the task store, queue, handler registry, worker
//! pool, retry controller and janitor together and exposes the caller
//! operations: submit, query, cancel, statistics and lifecycle control.
//!
//! One orchestrator is assumed per task store. Startup recovery treats
//! every `Running` record as orphaned.

use std::sync::Arc;
use std::time::Duration;

use taskforge_core::error::CoreError;
use taskforge_core::scheduling::PRIORITY_NORMAL;
use taskforge_core::store::TaskStore;
use taskforge_core::task::{NewTask, Task, TaskStatus};
use taskforge_core::task_events::TASK_SUBMITTED;
use taskforge_core::types::{Payload, TaskId};
use tokio::sync::{broadcast, Mutex};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::events::TaskEvent;
use crate::janitor;
use crate::persist;
use crate::registry::{HandlerRegistry, TaskHandler};
use crate::retry::RetryController;
use crate::state::{EngineState, RuntimeHandle};
use crate::stats::Statistics;
use crate::worker;

pub struct Orchestrator {
    state: Arc<EngineState>,
    retry: RetryController,
    /// Present while started.
    runtime: Mutex<Option<RuntimeHandle>>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn TaskStore>, config: EngineConfig) -> Self {
        let state = Arc::new(EngineState::new(store, config));
        Self {
            retry: RetryController::new(Arc::clone(&state)),
            state,
            runtime: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.state.config
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    /// Register the handler for `task_type`, replacing any previous one.
    pub async fn register(&self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.state.registry.register(task_type, handler).await;
    }

    /// Register a handler whose executions use `timeout` instead of the
    /// pool-wide one.
    pub async fn register_with_timeout(
        &self,
        task_type: impl Into<String>,
        handler: Arc<dyn TaskHandler>,
        timeout: Duration,
    ) {
        self.state
            .registry
            .register_with_timeout(task_type, handler, timeout)
            .await;
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.state.registry
    }

    // -----------------------------------------------------------------------
    // Submission and queries
    // -----------------------------------------------------------------------

    /// Persist a new `Pending` task and enqueue it. Never waits for
    /// execution.
    ///
    /// A store failure is returned to the caller; nothing is enqueued in
    /// that case.
    pub async fn submit(
        &self,
        task_type: impl Into<String>,
        session_id: impl Into<String>,
        payload: Payload,
        priority: i32,
        max_retries: u32,
    ) -> EngineResult<TaskId> {
        self.submit_task(NewTask {
            task_type: task_type.into(),
            session_id: session_id.into(),
            payload,
            priority,
            max_retries,
        })
        .await
    }

    /// [`submit`](Self::submit) with normal priority and the configured
    /// default retry budget.
    pub async fn submit_default(
        &self,
        task_type: impl Into<String>,
        session_id: impl Into<String>,
        payload: Payload,
    ) -> EngineResult<TaskId> {
        let max_retries = self.state.config.default_max_retries;
        self.submit(task_type, session_id, payload, PRIORITY_NORMAL, max_retries)
            .await
    }

    pub async fn submit_task(&self, input: NewTask) -> EngineResult<TaskId> {
        input.validate()?;
        let task = Task::new(input);

        let store = self.state.store.as_ref();
        let record = &task;
        persist::with_retry(&self.state, "create", task.id, move || store.create(record)).await?;

        self.state.queue.enqueue(task.id, task.priority).await;
        self.state.counters.record_submitted();
        tracing::info!(
            task_id = %task.id,
            task_type = %task.task_type,
            session_id = %task.session_id,
            priority = task.priority,
            max_retries = task.max_retries,
            "Task submitted"
        );
        self.state.publish(TaskEvent::new(TASK_SUBMITTED, &task));
        Ok(task.id)
    }

    /// Current record for `task_id`.
    pub async fn get_status(&self, task_id: TaskId) -> EngineResult<Task> {
        self.state
            .store
            .get(task_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "Task",
                    id: task_id.to_string(),
                }
                .into()
            })
    }

    /// All tasks of a session, newest first.
    pub async fn list_by_session(&self, session_id: &str) -> EngineResult<Vec<Task>> {
        Ok(self.state.store.list_by_session(session_id).await?)
    }

    /// Cancel a running task.
    ///
    /// Signals the handler's token and marks the task `Failed` with
    /// `"cancelled"` whether or not the handler reacts. Returns `false` for
    /// tasks that are not currently executing (pending, terminal, unknown).
    ///
    /// If the store rejects the write, the handler is still stopped, the
    /// write is retried in the background until it lands, and the store
    /// error is returned.
    pub async fn cancel(&self, task_id: TaskId) -> EngineResult<bool> {
        let Some(token) = self.state.running.remove(&task_id) else {
            tracing::debug!(%task_id, "Cancel ignored, task is not running");
            return Ok(false);
        };
        token.cancel();

        match self.retry.cancel(task_id).await {
            Ok(recorded) => Ok(recorded),
            Err(e) => {
                match self.runtime.lock().await.as_ref() {
                    Some(runtime) => self.retry.redrive_cancel(task_id, runtime),
                    None => tracing::warn!(%task_id, "Cancellation not recorded, engine is stopped"),
                }
                Err(e.into())
            }
        }
    }

    pub async fn statistics(&self) -> Statistics {
        let queued = self.state.queue.len().await;
        self.state
            .counters
            .snapshot(self.state.running.len(), queued)
    }

    /// Receive lifecycle events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.state.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Recover unfinished tasks from the store, then start the workers and
    /// the janitor. Calling `start` on a started orchestrator is a no-op.
    pub async fn start(&self) -> EngineResult<()> {
        let mut runtime_slot = self.runtime.lock().await;
        if runtime_slot.is_some() {
            return Ok(());
        }

        let recovered = self.recover().await?;

        let runtime = RuntimeHandle::new();
        let workers = worker::spawn_workers(&self.state, &self.retry, &runtime);
        runtime.tracker.spawn(janitor::run(
            Arc::clone(&self.state.store),
            self.state.config.janitor,
            runtime.shutdown.clone(),
        ));
        *runtime_slot = Some(runtime);

        tracing::info!(workers, recovered, "Task orchestrator started");
        Ok(())
    }

    /// Stop the workers and the janitor and wait for them to drain.
    ///
    /// In-flight handlers are cancelled and their tasks handed back to
    /// `Pending`; queued tasks stay `Pending` in the store. Idempotent.
    pub async fn stop(&self) {
        let Some(runtime) = self.runtime.lock().await.take() else {
            return;
        };
        tracing::info!("Task orchestrator stopping");
        runtime.shutdown.cancel();
        runtime.tracker.close();
        runtime.tracker.wait().await;
        tracing::info!("Task orchestrator stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.runtime.lock().await.is_some()
    }

    /// Enqueue every unfinished task, oldest first. Orphaned `Running` and
    /// `Retrying` records are moved back to `Pending` first.
    async fn recover(&self) -> EngineResult<usize> {
        let store = self.state.store.as_ref();
        let unfinished = persist::with_retry(&self.state, "recover", TaskId::nil(), move || {
            store.list_by_status(&TaskStatus::RECOVERABLE)
        })
        .await?;

        let mut recovered = 0;
        for task in unfinished {
            let queued = match task.status {
                TaskStatus::Pending => {
                    self.state.queue.enqueue(task.id, task.priority).await;
                    true
                }
                from => {
                    tracing::info!(task_id = %task.id, status = %from, "Recovering orphaned task");
                    self.retry
                        .requeue(task.id, from, task.priority, "recover")
                        .await
                }
            };
            if queued {
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}
