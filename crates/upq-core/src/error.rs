//! Error types shared by the pipeline, the registry and the command surface.

use thiserror::Error;

use crate::task::{TaskId, TaskStatus};

/// Failure of one pipeline stage.
///
/// Every variant except `Aborted` becomes a Failed outcome carrying the
/// `Display` text as diagnostic. `Aborted` means the stage stopped at a
/// cancellation checkpoint and is always reported as Cancelled.
#[derive(Debug, Error)]
pub enum TransferError {
    /// I/O or network failure while fetching or pushing.
    #[error("transport error: {0}")]
    Transport(String),
    /// Remote store answered with a non-success status or an unusable body.
    #[error("{0}")]
    RemoteRejection(String),
    /// Temporary file could not be created, written or deleted.
    #[error("temporary file error: {0}")]
    Resource(#[from] std::io::Error),
    /// Stage stopped because the task's cancellation token was set.
    #[error("transfer aborted by cancellation")]
    Aborted,
    /// The registry refused a status change the pipeline needed.
    #[error(transparent)]
    State(#[from] TransitionError),
}

impl From<curl::Error> for TransferError {
    fn from(e: curl::Error) -> Self {
        TransferError::Transport(e.to_string())
    }
}

/// A caller command that was rejected without touching any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("task {0} not found")]
    UnknownTask(TaskId),
    #[error("task {0} does not belong to you")]
    NotOwner(TaskId),
}

/// Attempted status change that the registry refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("task {0} not found")]
    Missing(TaskId),
    #[error("task {task_id} cannot move from {from} to {to}")]
    Illegal {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}
