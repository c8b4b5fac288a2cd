use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use taskforge_core::store::TaskStore;
use taskforge_core::types::TaskId;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::EngineConfig;
use crate::events::{EventBus, TaskEvent};
use crate::queue::TaskQueue;
use crate::registry::HandlerRegistry;
use crate::stats::TaskCounters;

/// Everything shared between the orchestrator, its workers and the
/// scheduled retries.
pub(crate) struct EngineState {
    pub store: Arc<dyn TaskStore>,
    pub queue: TaskQueue,
    pub registry: HandlerRegistry,
    pub running: RunningSet,
    pub counters: TaskCounters,
    pub events: EventBus,
    pub config: EngineConfig,
}

impl EngineState {
    pub fn new(store: Arc<dyn TaskStore>, config: EngineConfig) -> Self {
        Self {
            store,
            queue: TaskQueue::new(),
            registry: HandlerRegistry::new(),
            running: RunningSet::default(),
            counters: TaskCounters::default(),
            events: EventBus::default(),
            config,
        }
    }

    pub fn publish(&self, event: TaskEvent) {
        self.events.publish(event);
    }
}

/// Shutdown signal and spawned-task tracker for one `start`/`stop` cycle.
#[derive(Clone)]
pub(crate) struct RuntimeHandle {
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
}

impl RuntimeHandle {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }
}

/// Cancellation tokens of the tasks currently executing, by id.
///
/// An id is present exactly while one worker owns the task, so this map
/// doubles as the active-execution gauge.
#[derive(Default)]
pub(crate) struct RunningSet {
    inner: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl RunningSet {
    /// Returns `false` if the id was already registered.
    pub fn insert(&self, task_id: TaskId, token: CancellationToken) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.contains_key(&task_id) {
            return false;
        }
        inner.insert(task_id, token);
        true
    }

    pub fn remove(&self, task_id: &TaskId) -> Option<CancellationToken> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
