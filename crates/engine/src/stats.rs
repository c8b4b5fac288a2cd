//! Process-lifetime counters and the statistics snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters since the orchestrator was created.
#[derive(Debug, Default)]
pub struct TaskCounters {
    total: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    store_failures: AtomicU64,
}

impl TaskCounters {
    pub fn record_submitted(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Combine the counters with the live gauges into a snapshot.
    pub fn snapshot(&self, active: usize, queued: usize) -> Statistics {
        let total = self.total.load(Ordering::Relaxed);
        let completed = self.completed.load(Ordering::Relaxed);
        Statistics {
            total,
            completed,
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            active,
            queued,
            success_rate: success_rate(completed, total),
            store_failures: self.store_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time engine statistics.
///
/// Counters cover this orchestrator instance only. `total` counts
/// submissions made through it, while `completed`, `failed` and `retried`
/// also count tasks recovered from the store at `start`. After a restart
/// with recovered work, `success_rate` can therefore exceed 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Tasks submitted through this orchestrator.
    pub total: u64,
    pub completed: u64,
    /// Tasks that reached `Failed`, including cancellations.
    pub failed: u64,
    /// Retry attempts scheduled.
    pub retried: u64,
    /// Executions in flight right now.
    pub active: usize,
    /// Task ids waiting in the queue right now.
    pub queued: usize,
    /// `completed / max(1, total) * 100`.
    pub success_rate: f64,
    /// Store writes abandoned after exhausting their attempts.
    pub store_failures: u64,
}

fn success_rate(completed: u64, total: u64) -> f64 {
    completed as f64 / total.max(1) as f64 * 100.0
}
