//! PostgreSQL-backed [`TaskStore`].

use async_trait::async_trait;
use sqlx::PgPool;
use taskforge_core::scheduling::state_machine::can_transition;
use taskforge_core::store::{StoreError, TaskStore};
use taskforge_core::task::{Task, TaskStatus, TaskUpdate};
use taskforge_core::types::{TaskId, Timestamp};

use crate::models::task::TaskRow;
use crate::repositories::TaskRepo;

/// Task store backed by the `background_tasks` table.
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Classify a sqlx error into the store taxonomy.
fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(err.to_string())
        }
        _ => StoreError::Unavailable(err.to_string()),
    }
}

fn into_tasks(rows: Vec<TaskRow>) -> Result<Vec<Task>, StoreError> {
    rows.into_iter().map(Task::try_from).collect()
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, task: &Task) -> Result<(), StoreError> {
        TaskRepo::create(&self.pool, task).await.map_err(|err| {
            let unique = err
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if unique {
                StoreError::Duplicate(task.id)
            } else {
                store_error(err)
            }
        })
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        TaskRepo::find_by_id(&self.pool, id)
            .await
            .map_err(store_error)?
            .map(Task::try_from)
            .transpose()
    }

    async fn update_status(
        &self,
        id: TaskId,
        expected: &[TaskStatus],
        update: &TaskUpdate,
    ) -> Result<Option<Task>, StoreError> {
        let allowed: Vec<TaskStatus> = expected
            .iter()
            .copied()
            .filter(|from| can_transition(*from, update.status))
            .collect();
        if allowed.is_empty() {
            return Ok(None);
        }

        let row = TaskRepo::transition(&self.pool, id, &allowed, update)
            .await
            .map_err(store_error)?;
        if row.is_none() {
            tracing::debug!(task_id = %id, to = %update.status, "Conditional status update matched no row");
        }
        row.map(Task::try_from).transpose()
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Task>, StoreError> {
        let rows = TaskRepo::list_by_session(&self.pool, session_id)
            .await
            .map_err(store_error)?;
        into_tasks(rows)
    }

    async fn list_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>, StoreError> {
        let rows = TaskRepo::list_by_status(&self.pool, statuses)
            .await
            .map_err(store_error)?;
        into_tasks(rows)
    }

    async fn delete_older_than(
        &self,
        cutoff: Timestamp,
        statuses: &[TaskStatus],
    ) -> Result<u64, StoreError> {
        TaskRepo::delete_older_than(&self.pool, cutoff, statuses)
            .await
            .map_err(store_error)
    }
}
