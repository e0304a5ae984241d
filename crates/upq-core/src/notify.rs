//! Status notifications toward the messaging side.
//!
//! The core emits one [`StatusUpdate`] when a task is queued, on each
//! status change and progress step, and exactly one when it reaches a
//! terminal status. Delivery is the sink's business.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::queue::SubmissionQueue;
use crate::task::{OwnerId, Task, TaskId, TaskStatus};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusDetail {
    None,
    /// Jobs ahead of this one when it was queued.
    Position(usize),
    /// Fetch progress in percent.
    Progress(u8),
    /// Remote identifier of a completed upload.
    Remote(String),
    Diagnostic(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub owner: OwnerId,
    pub name: String,
    pub status: TaskStatus,
    pub detail: StatusDetail,
    /// Jobs still waiting in the queue when the update was emitted.
    pub pending: usize,
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.detail) {
            (TaskStatus::Queued, StatusDetail::Position(0)) => {
                write!(f, "Processing immediately: {} (task {})", self.name, self.task_id)?
            }
            (TaskStatus::Queued, StatusDetail::Position(p)) => write!(
                f,
                "Added to queue. Position: #{} File: {} (task {})",
                p + 1,
                self.name,
                self.task_id
            )?,
            (TaskStatus::Downloading, StatusDetail::Progress(pct)) => {
                let filled = usize::from(*pct / 10).min(10);
                write!(
                    f,
                    "Downloading: {}% complete [{}{}] task {}",
                    pct,
                    "■".repeat(filled),
                    "□".repeat(10 - filled),
                    self.task_id
                )?
            }
            (TaskStatus::Completed, StatusDetail::Remote(id)) => {
                write!(f, "Upload successful! {}: {}", self.name, id)?
            }
            (TaskStatus::Failed, StatusDetail::Diagnostic(msg)) => {
                write!(f, "{} failed: {}", self.name, msg)?
            }
            (status, _) => write!(f, "{} {}: {}", self.name, self.task_id, status)?,
        }
        if self.status.is_terminal() && self.pending > 0 {
            write!(f, " ({} more file(s) in the queue)", self.pending)?;
        }
        Ok(())
    }
}

/// Receiver of status updates (chat channel, UI, log).
///
/// Updates are delivered while the task registry is locked, which keeps them
/// in status order. Implementations must return quickly and must not call
/// back into the service.
pub trait StatusSink: Send + Sync {
    fn on_status_changed(&self, update: &StatusUpdate);
}

/// Builds updates for a task and hands them to the sink, stamping the
/// current queue depth.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn StatusSink>,
    queue: Arc<SubmissionQueue>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn StatusSink>, queue: Arc<SubmissionQueue>) -> Self {
        Self { sink, queue }
    }

    pub fn emit(&self, task: &Task, status: TaskStatus, detail: StatusDetail) {
        let update = StatusUpdate {
            task_id: task.id,
            owner: task.owner,
            name: task.name.clone(),
            status,
            detail,
            pending: self.queue.depth(),
        };
        self.sink.on_status_changed(&update);
    }
}

/// Writes each update to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn on_status_changed(&self, update: &StatusUpdate) {
        tracing::info!(task_id = %update.task_id, owner = %update.owner, "{}", update);
    }
}

/// Forwards updates into an unbounded channel. Updates are dropped once the
/// receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<StatusUpdate>,
}

impl ChannelSink {
    pub fn channel() -> (Self, UnboundedReceiver<StatusUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn on_status_changed(&self, update: &StatusUpdate) {
        let _ = self.tx.send(update.clone());
    }
}
