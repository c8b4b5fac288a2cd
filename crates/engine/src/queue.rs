//! Process-local priority queue of pending task ids.
//!
//! Highest priority first; FIFO within a priority band. Nothing here is
//! durable: on restart the queue is rebuilt from the task store.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Duration;

use taskforge_core::types::TaskId;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// One queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub task_id: TaskId,
    pub priority: i32,
    /// Enqueue sequence number; lower is older.
    seq: u64,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: larger priority wins, then smaller seq.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct QueueInner {
    heap: BinaryHeap<QueueEntry>,
    /// Ids currently in `heap`; an id is never queued twice.
    queued: HashSet<TaskId>,
    next_seq: u64,
}

/// Concurrent priority queue shared by all workers.
#[derive(Default)]
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task id. Returns `false` if the id is already queued.
    pub async fn enqueue(&self, task_id: TaskId, priority: i32) -> bool {
        {
            let mut inner = self.inner.lock().await;
            if !inner.queued.insert(task_id) {
                return false;
            }
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.heap.push(QueueEntry {
                task_id,
                priority,
                seq,
            });
        }
        self.notify.notify_one();
        true
    }

    /// Pop the best entry without waiting.
    pub async fn try_dequeue(&self) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().await;
        let entry = inner.heap.pop()?;
        inner.queued.remove(&entry.task_id);
        Some(entry)
    }

    /// Wait for the best entry.
    ///
    /// Sleeps until an enqueue notification arrives or `poll_interval`
    /// elapses, whichever is first. Returns `None` once `cancel` fires;
    /// remaining entries stay queued.
    pub async fn dequeue(
        &self,
        cancel: &CancellationToken,
        poll_interval: Duration,
    ) -> Option<QueueEntry> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(entry) = self.try_dequeue().await {
                return Some(entry);
            }
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.heap.is_empty()
    }
}
