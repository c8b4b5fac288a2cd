//! Integration tests for `PgTaskStore` against a real database.
//!
//! Run with `DATABASE_URL` pointing at a scratch Postgres server and
//! `cargo test -p taskforge-db -- --ignored`.

use chrono::Utc;
use sqlx::PgPool;
use taskforge_core::store::{StoreError, TaskStore};
use taskforge_core::task::{NewTask, Task, TaskStatus, TaskUpdate};
use taskforge_core::types::Payload;
use taskforge_db::PgTaskStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_task(session: &str, priority: i32) -> Task {
    let mut payload = Payload::new();
    payload.insert("x".to_string(), serde_json::json!(1));
    Task::new(NewTask {
        task_type: "echo".to_string(),
        session_id: session.to_string(),
        payload,
        priority,
        max_retries: 2,
    })
}

// ---------------------------------------------------------------------------
// Test: create then load round-trips every field
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn create_and_get(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let task = new_task("s1", 3);
    store.create(&task).await.unwrap();

    let loaded = store.get(task.id).await.unwrap().expect("task should exist");
    assert_eq!(loaded.id, task.id);
    assert_eq!(loaded.status, TaskStatus::Pending);
    assert_eq!(loaded.priority, 3);
    assert_eq!(loaded.payload["x"], 1);
    assert_eq!(loaded.max_retries, 2);
}

// ---------------------------------------------------------------------------
// Test: duplicate ids are reported as Duplicate
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_create_is_rejected(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let task = new_task("s1", 2);
    store.create(&task).await.unwrap();

    let err = store.create(&task).await.unwrap_err();
    assert_eq!(err, StoreError::Duplicate(task.id));
}

// ---------------------------------------------------------------------------
// Test: conditional transitions are compare-and-set
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn only_one_claim_wins(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let task = new_task("s1", 2);
    store.create(&task).await.unwrap();

    let claim = TaskUpdate::to(TaskStatus::Running).started_at(Utc::now());
    let first = store
        .update_status(task.id, &[TaskStatus::Pending], &claim)
        .await
        .unwrap();
    let second = store
        .update_status(task.id, &[TaskStatus::Pending], &claim)
        .await
        .unwrap();

    assert_eq!(first.map(|t| t.status), Some(TaskStatus::Running));
    assert!(second.is_none());
}

// ---------------------------------------------------------------------------
// Test: started_at survives a retry cycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn started_at_is_set_once(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let task = new_task("s1", 2);
    store.create(&task).await.unwrap();

    let first_start = Utc::now();
    store
        .update_status(
            task.id,
            &[TaskStatus::Pending],
            &TaskUpdate::to(TaskStatus::Running).started_at(first_start),
        )
        .await
        .unwrap();
    store
        .update_status(
            task.id,
            &[TaskStatus::Running],
            &TaskUpdate::to(TaskStatus::Retrying)
                .retry_count(1)
                .error("boom"),
        )
        .await
        .unwrap();
    store
        .update_status(
            task.id,
            &[TaskStatus::Retrying],
            &TaskUpdate::to(TaskStatus::Pending),
        )
        .await
        .unwrap();
    let rerun = store
        .update_status(
            task.id,
            &[TaskStatus::Pending],
            &TaskUpdate::to(TaskStatus::Running)
                .started_at(first_start + chrono::Duration::seconds(30)),
        )
        .await
        .unwrap()
        .unwrap();

    // Postgres keeps microseconds only.
    let stored = rerun.started_at.unwrap();
    assert!((stored - first_start).num_milliseconds().abs() < 1);
    assert_eq!(rerun.retry_count, 1);
    assert_eq!(rerun.error_message.as_deref(), Some("boom"));
}

// ---------------------------------------------------------------------------
// Test: listing and retention
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn list_by_session_and_status(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let a = new_task("s1", 2);
    let b = new_task("s1", 2);
    let c = new_task("s2", 2);
    for t in [&a, &b, &c] {
        store.create(t).await.unwrap();
    }

    let session = store.list_by_session("s1").await.unwrap();
    assert_eq!(session.len(), 2);
    assert!(session.iter().all(|t| t.session_id == "s1"));

    let pending = store.list_by_status(&[TaskStatus::Pending]).await.unwrap();
    assert_eq!(pending.len(), 3);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn delete_older_than_respects_cutoff(pool: PgPool) {
    let store = PgTaskStore::new(pool);
    let now = Utc::now();

    let mut old = new_task("s1", 2);
    old.status = TaskStatus::Completed;
    old.completed_at = Some(now - chrono::Duration::days(8));
    let mut recent = new_task("s1", 2);
    recent.status = TaskStatus::Failed;
    recent.completed_at = Some(now - chrono::Duration::days(6));
    for t in [&old, &recent] {
        store.create(t).await.unwrap();
    }

    let deleted = store
        .delete_older_than(now - chrono::Duration::days(7), &TaskStatus::TERMINAL)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(store.get(old.id).await.unwrap().is_none());
    assert!(store.get(recent.id).await.unwrap().is_some());
}
