//! Delayed eviction of finished tasks.
//!
//! Each terminal task gets one timer. Timers are tracked so shutdown can list
//! them and either wait for them or drop them. A closed reaper schedules
//! nothing new.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::task::{OwnerId, TaskId, TaskRegistry};

type PendingMap = Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>;

pub struct Reaper {
    registry: Arc<TaskRegistry>,
    pending: PendingMap,
    closed: AtomicBool,
}

impl Reaper {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            pending: Arc::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Removes `task_id` from the registry once `delay` has elapsed. Not
    /// cancellable; removing an already-removed task does nothing.
    /// Ignored after `close`. Must be called from within a tokio runtime.
    pub fn schedule_removal(&self, task_id: TaskId, owner: OwnerId, delay: Duration) {
        let registry = Arc::clone(&self.registry);
        let pending = Arc::clone(&self.pending);
        let mut map = lock(&self.pending);
        // Checked under the map lock; `close` drains after setting the flag.
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(task_id = %task_id, "reaper closed; task stays registered");
            return;
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.remove(task_id);
            lock(&pending).remove(&task_id);
            tracing::debug!(task_id = %task_id, owner = %owner, "reaped finished task");
        });
        if let Some(previous) = map.insert(task_id, handle) {
            previous.abort();
        }
    }

    /// Tasks with a removal still pending.
    pub fn pending(&self) -> Vec<TaskId> {
        let mut ids: Vec<_> = lock(&self.pending).keys().copied().collect();
        ids.sort();
        ids
    }

    /// Drops every pending removal; those tasks stay in the registry.
    /// Returns how many were dropped.
    pub fn abandon_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        for (_, handle) in &drained {
            handle.abort();
        }
        drained.len()
    }

    /// Stops accepting new removals and abandons the pending ones. Returns
    /// how many were abandoned.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        self.abandon_all()
    }

    /// Waits until every pending removal has run.
    pub async fn join_all(&self) {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        for (task_id, handle) in drained {
            if let Err(e) = handle.await {
                tracing::warn!(task_id = %task_id, "reaper did not finish: {}", e);
            }
        }
    }
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<TaskId, JoinHandle<()>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
