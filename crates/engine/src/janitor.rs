//! Periodic deletion of old terminal tasks.
//!
//! Runs on a fixed interval using `tokio::time::interval`. The first sweep
//! happens as soon as the loop starts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskforge_core::store::{StoreError, TaskStore};
use taskforge_core::task::TaskStatus;
use tokio_util::sync::CancellationToken;

/// How often the janitor runs by default.
pub const DEFAULT_JANITOR_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long terminal tasks are kept by default.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Janitor cadence and retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorConfig {
    pub interval: Duration,
    pub retention: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_JANITOR_INTERVAL,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn TaskStore>, config: JanitorConfig, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = config.interval.as_secs(),
        retention_secs = config.retention.as_secs(),
        "Task janitor started"
    );

    let mut interval = tokio::time::interval(config.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task janitor stopping");
                break;
            }
            _ = interval.tick() => {
                match sweep(store.as_ref(), config.retention).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Task janitor: purged old tasks");
                    }
                    Ok(_) => tracing::debug!("Task janitor: no tasks to purge"),
                    Err(e) => tracing::error!(error = %e, "Task janitor: cleanup failed"),
                }
            }
        }
    }
}

/// Delete `Completed` and `Failed` tasks whose `completed_at` is older
/// than `retention`. Returns the number of deleted tasks.
pub async fn sweep(store: &dyn TaskStore, retention: Duration) -> Result<u64, StoreError> {
    let cutoff = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| Utc::now().checked_sub_signed(retention))
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
    store.delete_older_than(cutoff, &TaskStatus::TERMINAL).await
}
