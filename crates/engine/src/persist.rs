//! Bounded retries around engine-initiated store calls.

use std::future::Future;
use std::time::Duration;

use taskforge_core::store::StoreError;
use taskforge_core::task::{Task, TaskStatus, TaskUpdate};
use taskforge_core::types::TaskId;

use crate::state::EngineState;

/// Run `op`, retrying transient store errors up to
/// `store_write_attempts` times with linearly increasing delay.
///
/// A transient error that survives every attempt is counted as a store
/// failure and logged at `error`.
pub(crate) async fn with_retry<T, F, Fut>(
    state: &EngineState,
    operation: &'static str,
    task_id: TaskId,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let attempts = state.config.store_write_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(
                    %task_id,
                    operation,
                    attempt,
                    error = %e,
                    "Task store write failed, retrying"
                );
                tokio::time::sleep(retry_delay(state.config.store_retry_delay, attempt)).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    state.counters.record_store_failure();
                }
                tracing::error!(
                    %task_id,
                    operation,
                    attempts = attempt,
                    error = %e,
                    "Task store write abandoned"
                );
                return Err(e);
            }
        }
    }
}

/// Linear backoff between store attempts, saturating instead of overflowing.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

/// Conditional status transition with persistence retries.
pub(crate) async fn transition(
    state: &EngineState,
    operation: &'static str,
    task_id: TaskId,
    expected: &[TaskStatus],
    update: TaskUpdate,
) -> Result<Option<Task>, StoreError> {
    let store = state.store.as_ref();
    let update = &update;
    with_retry(state, operation, task_id, move || {
        store.update_status(task_id, expected, update)
    })
    .await
}

/// Load a task record with persistence retries.
pub(crate) async fn load(state: &EngineState, task_id: TaskId) -> Result<Option<Task>, StoreError> {
    let store = state.store.as_ref();
    with_retry(state, "load", task_id, move || store.get(task_id)).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use taskforge_core::store::MemoryTaskStore;

    use super::*;
    use crate::config::EngineConfig;

    fn state(attempts: u32) -> EngineState {
        let config = EngineConfig {
            store_write_attempts: attempts,
            store_retry_delay: Duration::from_millis(1),
            ..EngineConfig::default()
        };
        EngineState::new(Arc::new(MemoryTaskStore::new()), config)
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let state = state(3);
        let calls = AtomicU32::new(0);

        let result = with_retry(&state, "test", uuid::Uuid::now_v7(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StoreError::Unavailable("down".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(state.counters.snapshot(0, 0).store_failures, 0);
    }

    #[test]
    fn retry_delay_grows_linearly_and_saturates() {
        assert_eq!(retry_delay(Duration::from_millis(100), 3), Duration::from_millis(300));
        assert_eq!(retry_delay(Duration::MAX, 2), Duration::MAX);
    }

    #[tokio::test]
    async fn give_up_is_counted() {
        let state = state(2);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&state, "test", uuid::Uuid::now_v7(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Unavailable("down".into())) }
        })
        .await;

        assert_matches!(result, Err(StoreError::Unavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(state.counters.snapshot(0, 0).store_failures, 1);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let state = state(5);
        let calls = AtomicU32::new(0);
        let id = uuid::Uuid::now_v7();

        let result: Result<(), _> = with_retry(&state, "test", id, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(StoreError::Duplicate(id)) }
        })
        .await;

        assert_eq!(result, Err(StoreError::Duplicate(id)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(state.counters.snapshot(0, 0).store_failures, 0);
    }
}
