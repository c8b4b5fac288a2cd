//! Row model for the `background_tasks` table.

use sqlx::FromRow;
use taskforge_core::store::StoreError;
use taskforge_core::task::{Task, TaskStatus};
use taskforge_core::types::{Payload, TaskId, Timestamp};

/// A row from the `background_tasks` table.
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: TaskId,
    pub session_id: String,
    pub task_type: String,
    pub status: String,
    pub priority: i32,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let status: TaskStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("task {}: {e}", row.id)))?;

        Ok(Task {
            id: row.id,
            session_id: row.session_id,
            task_type: row.task_type,
            status,
            priority: row.priority,
            payload: into_object(row.id, "payload", row.payload)?,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: into_count(row.id, "retry_count", row.retry_count)?,
            max_retries: into_count(row.id, "max_retries", row.max_retries)?,
            error_message: row.error_message,
            result: row
                .result
                .map(|value| into_object(row.id, "result", value))
                .transpose()?,
        })
    }
}

fn into_object(id: TaskId, column: &str, value: serde_json::Value) -> Result<Payload, StoreError> {
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StoreError::Corrupt(format!(
            "task {id}: {column} is not a JSON object: {other}"
        ))),
    }
}

fn into_count(id: TaskId, column: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("task {id}: negative {column} ({value})")))
}

/// Convert a counter for binding into an INTEGER column.
///
/// `NewTask::validate` caps `max_retries` at `MAX_RETRIES_LIMIT` and
/// `retry_count` never exceeds it, so the fallback is unreachable.
pub(crate) fn count_to_db(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row() -> TaskRow {
        TaskRow {
            id: uuid::Uuid::now_v7(),
            session_id: "s1".to_string(),
            task_type: "export".to_string(),
            status: "completed".to_string(),
            priority: 3,
            payload: serde_json::json!({"resource_id": "r-1"}),
            result: Some(serde_json::json!({"url": "/exports/r-1.json"})),
            error_message: None,
            retry_count: 1,
            max_retries: 3,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn row_converts_to_task() {
        let task = Task::try_from(row()).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.payload["resource_id"], "r-1");
        assert_eq!(task.result.unwrap()["url"], "/exports/r-1.json");
        assert_eq!(task.retry_count, 1);
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let mut r = row();
        r.status = "exploded".to_string();
        assert!(matches!(Task::try_from(r), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn non_object_payload_is_corrupt() {
        let mut r = row();
        r.payload = serde_json::json!([1, 2, 3]);
        assert!(matches!(Task::try_from(r), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn negative_counter_is_corrupt() {
        let mut r = row();
        r.retry_count = -1;
        assert!(matches!(Task::try_from(r), Err(StoreError::Corrupt(_))));
    }
}
