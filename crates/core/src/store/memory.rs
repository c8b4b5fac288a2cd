use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoreError, TaskStore};
use crate::scheduling::state_machine::can_transition;
use crate::task::{Task, TaskStatus, TaskUpdate};
use crate::types::{TaskId, Timestamp};

/// In-process task store.
///
/// Suitable for tests and single-process deployments where tasks need not
/// survive a restart. [`set_unavailable`](Self::set_unavailable) simulates
/// an outage of the backing store.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
    unavailable: AtomicBool,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with [`StoreError::Unavailable`] until
    /// switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::Duplicate(task.id));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        self.check_available()?;
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: TaskId,
        expected: &[TaskStatus],
        update: &TaskUpdate,
    ) -> Result<Option<Task>, StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.write().await;
        let Some(task) = tasks.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.contains(&task.status) || !can_transition(task.status, update.status) {
            return Ok(None);
        }
        task.apply(update);
        Ok(Some(task.clone()))
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Task>, StoreError> {
        self.check_available()?;
        let mut found: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn list_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>, StoreError> {
        self.check_available()?;
        let mut found: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| statuses.contains(&t.status))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn delete_older_than(
        &self,
        cutoff: Timestamp,
        statuses: &[TaskStatus],
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, t| {
            let expired = statuses.contains(&t.status)
                && t.completed_at.is_some_and(|completed| completed < cutoff);
            !expired
        });
        Ok((before - tasks.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::NewTask;
    use crate::types::Payload;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn task(session: &str) -> Task {
        Task::new(NewTask {
            task_type: "analytics".to_string(),
            session_id: session.to_string(),
            payload: Payload::new(),
            priority: 2,
            max_retries: 3,
        })
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = MemoryTaskStore::new();
        let t = task("s1");
        store.create(&t).await.unwrap();

        let loaded = store.get(t.id).await.unwrap().expect("task should exist");
        assert_eq!(loaded, t);
        assert!(store.get(uuid::Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = MemoryTaskStore::new();
        let t = task("s1");
        store.create(&t).await.unwrap();
        assert_matches!(store.create(&t).await, Err(StoreError::Duplicate(id)) if id == t.id);
    }

    #[tokio::test]
    async fn update_applies_only_from_expected_status() {
        let store = MemoryTaskStore::new();
        let t = task("s1");
        store.create(&t).await.unwrap();

        let running = TaskUpdate::to(TaskStatus::Running).started_at(Utc::now());
        let first = store
            .update_status(t.id, &[TaskStatus::Pending], &running)
            .await
            .unwrap();
        assert_eq!(first.map(|t| t.status), Some(TaskStatus::Running));

        // A second claim must lose the compare-and-set.
        let second = store
            .update_status(t.id, &[TaskStatus::Pending], &running)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn update_rejects_transitions_outside_the_state_machine() {
        let store = MemoryTaskStore::new();
        let t = task("s1");
        store.create(&t).await.unwrap();

        let completed = TaskUpdate::to(TaskStatus::Completed).completed_at(Utc::now());
        let result = store
            .update_status(t.id, &[TaskStatus::Pending], &completed)
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(
            store.get(t.id).await.unwrap().unwrap().status,
            TaskStatus::Pending
        );
    }

    #[tokio::test]
    async fn list_by_session_filters_and_orders_newest_first() {
        let store = MemoryTaskStore::new();
        let mut older = task("s1");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = task("s1");
        let other = task("s2");
        for t in [&older, &newer, &other] {
            store.create(t).await.unwrap();
        }

        let listed = store.list_by_session("s1").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn delete_older_than_only_touches_matching_terminal_tasks() {
        let store = MemoryTaskStore::new();
        let now = Utc::now();

        let mut old_done = task("s1");
        old_done.status = TaskStatus::Completed;
        old_done.completed_at = Some(now - chrono::Duration::days(8));

        let mut recent_done = task("s1");
        recent_done.status = TaskStatus::Completed;
        recent_done.completed_at = Some(now - chrono::Duration::days(6));

        let pending = task("s1");

        for t in [&old_done, &recent_done, &pending] {
            store.create(t).await.unwrap();
        }

        let deleted = store
            .delete_older_than(now - chrono::Duration::days(7), &TaskStatus::TERMINAL)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get(old_done.id).await.unwrap().is_none());
        assert!(store.get(recent_done.id).await.unwrap().is_some());
        assert!(store.get(pending.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryTaskStore::new();
        store.set_unavailable(true);
        assert_matches!(store.create(&task("s1")).await, Err(StoreError::Unavailable(_)));
        assert_matches!(store.list_by_session("s1").await, Err(StoreError::Unavailable(_)));

        store.set_unavailable(false);
        assert!(store.create(&task("s1")).await.is_ok());
        assert_eq!(store.len().await, 1);
    }
}
