//! In-memory task registry with its owner index.
//!
//! Both maps live behind a single lock, so a reader never sees a task in one
//! and not the other.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use crate::control::CancellationToken;
use crate::error::{CommandError, TransitionError};

use super::{OwnerId, Task, TaskId, TaskStatus, TerminalOutcome};

#[derive(Default)]
pub struct TaskRegistry {
    state: RwLock<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    next_task_id: u64,
    tasks: HashMap<TaskId, Task>,
    owners: HashMap<OwnerId, Vec<TaskId>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Queued task for `owner` and returns its id.
    pub fn register(&self, owner: OwnerId, name: &str) -> TaskId {
        self.register_with(owner, name, |_| {})
    }

    /// Like `register`, but hands the new task to `on_registered` before the
    /// lock is released.
    pub fn register_with(
        &self,
        owner: OwnerId,
        name: &str,
        on_registered: impl FnOnce(&Task),
    ) -> TaskId {
        let mut state = self.write();
        state.next_task_id = state.next_task_id.saturating_add(1);
        let id = TaskId(state.next_task_id);
        state.tasks.insert(
            id,
            Task {
                id,
                owner,
                name: name.to_string(),
                status: TaskStatus::Queued,
                token: CancellationToken::new(),
                result: None,
                created_at: SystemTime::now(),
                finished_at: None,
            },
        );
        state.owners.entry(owner).or_default().push(id);
        if let Some(task) = state.tasks.get(&id) {
            on_registered(task);
        }
        id
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.read().tasks.get(&id).cloned()
    }

    /// Tasks of `owner` in submission order.
    pub fn list_by_owner(&self, owner: OwnerId) -> Vec<Task> {
        let state = self.read();
        state
            .owners
            .get(&owner)
            .map(|ids| ids.iter().filter_map(|id| state.tasks.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Ids of `owner`'s tasks in submission order.
    pub fn owned_ids(&self, owner: OwnerId) -> Vec<TaskId> {
        self.read().owners.get(&owner).cloned().unwrap_or_default()
    }

    /// Removes the task from both maps. Absent ids are ignored.
    pub fn remove(&self, id: TaskId) {
        let mut state = self.write();
        let Some(task) = state.tasks.remove(&id) else {
            return;
        };
        if let Some(ids) = state.owners.get_mut(&task.owner) {
            ids.retain(|t| *t != id);
            if ids.is_empty() {
                state.owners.remove(&task.owner);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `f` with the task if it is currently in `status`; returns whether
    /// it ran. The read lock is held for the call, so the status cannot change
    /// under `f`. `f` must not call back into the registry.
    pub fn inspect_if(&self, id: TaskId, status: TaskStatus, f: impl FnOnce(&Task)) -> bool {
        let state = self.read();
        match state.tasks.get(&id) {
            Some(task) if task.status == status => {
                f(task);
                true
            }
            _ => false,
        }
    }

    /// Moves a task along one edge of the state machine.
    pub fn transition(&self, id: TaskId, next: TaskStatus) -> Result<(), TransitionError> {
        self.transition_with(id, next, |_| {})
    }

    /// Like `transition`, but calls `on_changed` with the updated task while
    /// the write lock is still held.
    pub fn transition_with(
        &self,
        id: TaskId,
        next: TaskStatus,
        on_changed: impl FnOnce(&Task),
    ) -> Result<(), TransitionError> {
        let mut state = self.write();
        let task = state.tasks.get_mut(&id).ok_or(TransitionError::Missing(id))?;
        if !task.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                task_id: id,
                from: task.status,
                to: next,
            });
        }
        tracing::debug!(task_id = %id, from = %task.status, to = %next, "status change");
        task.status = next;
        on_changed(task);
        Ok(())
    }

    /// Records the terminal outcome. A Cancelled outcome on a task that never
    /// saw a cancel request (status not yet Cancelling) passes through
    /// Cancelling first so the recorded path stays valid.
    pub fn finish(&self, id: TaskId, outcome: &TerminalOutcome) -> Result<(), TransitionError> {
        let mut state = self.write();
        let task = state.tasks.get_mut(&id).ok_or(TransitionError::Missing(id))?;
        let next = outcome.status();
        if next == TaskStatus::Cancelled && task.status.can_transition_to(TaskStatus::Cancelling) {
            task.status = TaskStatus::Cancelling;
        }
        if !task.status.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                task_id: id,
                from: task.status,
                to: next,
            });
        }
        tracing::debug!(task_id = %id, from = %task.status, to = %next, "terminal status");
        task.status = next;
        task.result = outcome.result();
        task.finished_at = Some(SystemTime::now());
        Ok(())
    }

    /// Sets the task's cancellation token on behalf of `owner` and flips a
    /// non-terminal task to Cancelling. Returns the status the task had
    /// before the request. Rejected requests change nothing.
    pub fn request_cancel(&self, id: TaskId, owner: OwnerId) -> Result<TaskStatus, CommandError> {
        self.request_cancel_with(id, owner, |_| {})
    }

    /// Like `request_cancel`; `on_cancelling` runs under the write lock, only
    /// when this request is the one that moved the task to Cancelling.
    pub fn request_cancel_with(
        &self,
        id: TaskId,
        owner: OwnerId,
        on_cancelling: impl FnOnce(&Task),
    ) -> Result<TaskStatus, CommandError> {
        let mut state = self.write();
        let task = state.tasks.get_mut(&id).ok_or(CommandError::UnknownTask(id))?;
        if task.owner != owner {
            return Err(CommandError::NotOwner(id));
        }
        let prior = task.status;
        if prior.is_terminal() {
            return Ok(prior);
        }
        task.token.cancel();
        if prior != TaskStatus::Cancelling {
            task.status = TaskStatus::Cancelling;
            tracing::debug!(task_id = %id, from = %prior, "cancel requested");
            on_cancelling(task);
        }
        Ok(prior)
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
