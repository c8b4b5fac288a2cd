//! Repository for the `background_tasks` table.
//!
//! Status transitions are conditional `UPDATE ... WHERE status = ANY(...)`
//! statements so that concurrent workers can never both claim one task.

use sqlx::PgPool;
use taskforge_core::task::{Task, TaskStatus, TaskUpdate};
use taskforge_core::types::{TaskId, Timestamp};

use crate::models::task::{count_to_db, TaskRow};

/// Column list for `background_tasks` queries.
const COLUMNS: &str = "\
    id, session_id, task_type, status, priority, \
    payload, result, error_message, retry_count, max_retries, \
    created_at, started_at, completed_at";

fn status_names(statuses: &[TaskStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Provides persistence operations for background tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new task record.
    pub async fn create(pool: &PgPool, task: &Task) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO background_tasks \
                 (id, session_id, task_type, status, priority, payload, result, \
                  error_message, retry_count, max_retries, created_at, started_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(task.id)
        .bind(&task.session_id)
        .bind(&task.task_type)
        .bind(task.status.as_str())
        .bind(task.priority)
        .bind(serde_json::Value::Object(task.payload.clone()))
        .bind(task.result.clone().map(serde_json::Value::Object))
        .bind(&task.error_message)
        .bind(count_to_db(task.retry_count))
        .bind(count_to_db(task.max_retries))
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a task by its ID.
    pub async fn find_by_id(pool: &PgPool, id: TaskId) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM background_tasks WHERE id = $1");
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Apply a status transition if the current status is in `expected`.
    ///
    /// `started_at` and `completed_at` are only written while still NULL;
    /// the other optional fields keep their value when `None` is bound.
    /// Returns `None` when no row matched.
    pub async fn transition(
        pool: &PgPool,
        id: TaskId,
        expected: &[TaskStatus],
        update: &TaskUpdate,
    ) -> Result<Option<TaskRow>, sqlx::Error> {
        let query = format!(
            "UPDATE background_tasks \
             SET status = $2, \
                 started_at = COALESCE(started_at, $3), \
                 completed_at = COALESCE(completed_at, $4), \
                 error_message = COALESCE($5, error_message), \
                 result = COALESCE($6, result), \
                 retry_count = COALESCE($7, retry_count) \
             WHERE id = $1 AND status = ANY($8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(id)
            .bind(update.status.as_str())
            .bind(update.started_at)
            .bind(update.completed_at)
            .bind(&update.error_message)
            .bind(update.result.clone().map(serde_json::Value::Object))
            .bind(update.retry_count.map(count_to_db))
            .bind(status_names(expected))
            .fetch_optional(pool)
            .await
    }

    /// List all tasks for a session, newest first.
    pub async fn list_by_session(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM background_tasks \
             WHERE session_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    /// List all tasks in one of `statuses`, oldest first.
    pub async fn list_by_status(
        pool: &PgPool,
        statuses: &[TaskStatus],
    ) -> Result<Vec<TaskRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM background_tasks \
             WHERE status = ANY($1) \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, TaskRow>(&query)
            .bind(status_names(statuses))
            .fetch_all(pool)
            .await
    }

    /// Delete tasks in `statuses` that completed before `cutoff`.
    pub async fn delete_older_than(
        pool: &PgPool,
        cutoff: Timestamp,
        statuses: &[TaskStatus],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM background_tasks \
             WHERE status = ANY($1) AND completed_at < $2",
        )
        .bind(status_names(statuses))
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
