//! Task model: ids, owners, the status state machine and the task record.
//!
//! Records live in the [`TaskRegistry`]; the queue and the pipeline refer to
//! them by [`TaskId`] only.

mod registry;

pub use registry::TaskRegistry;

use std::fmt;
use std::time::SystemTime;

use crate::control::CancellationToken;

/// Opaque task identifier. Allocated monotonically; never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TaskId)
    }
}

/// Identity of the submitting caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task status.
///
/// Queued → Downloading → Uploading → Completed; any non-terminal state may
/// move to Cancelling (then Cancelled) or to Failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Queued,
    Downloading,
    Uploading,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// True while the pipeline is moving bytes for this task.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Downloading | TaskStatus::Uploading)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Queued, Downloading) | (Downloading, Uploading) | (Uploading, Completed) => true,
            (Cancelling, Cancelled) => true,
            (from, Cancelling) | (from, Failed) => !from.is_terminal() && from != next,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::Downloading => "Downloading",
            TaskStatus::Uploading => "Uploading",
            TaskStatus::Cancelling => "Cancelling...",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// What a finished task produced: the remote identifier, or a diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskResult {
    Remote(String),
    Diagnostic(String),
}

/// How a pipeline execution ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed(String),
    Failed(String),
    Cancelled,
}

impl TerminalOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TerminalOutcome::Completed(_) => TaskStatus::Completed,
            TerminalOutcome::Failed(_) => TaskStatus::Failed,
            TerminalOutcome::Cancelled => TaskStatus::Cancelled,
        }
    }

    pub(crate) fn result(&self) -> Option<TaskResult> {
        match self {
            TerminalOutcome::Completed(id) => Some(TaskResult::Remote(id.clone())),
            TerminalOutcome::Failed(msg) => Some(TaskResult::Diagnostic(msg.clone())),
            TerminalOutcome::Cancelled => None,
        }
    }
}

/// One submitted transfer job. Snapshots handed out by the registry are
/// clones; the token inside is shared with the live record.
#[derive(Clone, Debug)]
pub struct Task {
    pub id: TaskId,
    pub owner: OwnerId,
    pub name: String,
    pub status: TaskStatus,
    pub token: CancellationToken,
    pub result: Option<TaskResult>,
    pub created_at: SystemTime,
    pub finished_at: Option<SystemTime>,
}
