//! Submission queue and the single worker that drains it.
//!
//! The queue is an unbounded FIFO. The worker pops an entry and claims the
//! "active" flag under the same lock, so at most one pipeline execution runs
//! at any time and a waiting entry is never also counted as executing.

mod worker;

pub use worker::WorkerLoop;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::pipeline::Source;
use crate::task::TaskId;

/// A queued job: the task it belongs to plus what the pipeline needs to run it.
pub struct QueueEntry {
    pub task_id: TaskId,
    pub source: Box<dyn Source>,
}

impl std::fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEntry")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct SubmissionQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    /// Mirror of `entries.len()`, written under the lock, read without it.
    waiting: AtomicUsize,
    active: AtomicBool,
    notify: Notify,
}

/// Releases the queue's active flag when dropped.
pub struct ActiveGuard<'a> {
    active: &'a AtomicBool,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` and returns how many jobs are ahead of it, counting the
    /// one currently executing. Never blocks on the worker.
    pub fn enqueue(&self, entry: QueueEntry) -> usize {
        self.enqueue_with(|_| entry).0
    }

    /// Like `enqueue`, but builds the entry from its position while the queue
    /// lock is held, so the worker cannot claim it before `make_entry` returns.
    /// `depth` stays usable from inside `make_entry`.
    pub fn enqueue_with(&self, make_entry: impl FnOnce(usize) -> QueueEntry) -> (usize, TaskId) {
        let (position, task_id) = {
            let mut entries = self.entries();
            let ahead = entries.len() + usize::from(self.is_active());
            let entry = make_entry(ahead);
            let task_id = entry.task_id;
            entries.push_back(entry);
            self.waiting.store(entries.len(), Ordering::Release);
            (ahead, task_id)
        };
        self.notify.notify_one();
        (position, task_id)
    }

    /// Jobs waiting to be claimed (excludes the one executing).
    pub fn depth(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Pops the oldest entry and claims the active flag. Returns `None` when
    /// another execution holds the flag or the queue is empty.
    pub fn try_claim(&self) -> Option<(ActiveGuard<'_>, QueueEntry)> {
        let mut entries = self.entries();
        if entries.is_empty()
            || self
                .active
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
        {
            return None;
        }
        let guard = ActiveGuard {
            active: &self.active,
        };
        let entry = entries.pop_front()?;
        self.waiting.store(entries.len(), Ordering::Release);
        Some((guard, entry))
    }

    /// Resolves once at least one entry is waiting.
    pub async fn wait_non_empty(&self) {
        loop {
            let notified = self.notify.notified();
            if self.depth() > 0 {
                return;
            }
            notified.await;
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
