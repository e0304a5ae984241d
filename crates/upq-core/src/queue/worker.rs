//! The worker loop: one pipeline execution at a time, forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::notify::{Reporter, StatusDetail};
use crate::pipeline::TransferPipeline;
use crate::reaper::Reaper;
use crate::task::{TaskId, TaskRegistry, TerminalOutcome};

use super::{QueueEntry, SubmissionQueue};

pub struct WorkerLoop {
    pub(crate) queue: Arc<SubmissionQueue>,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) pipeline: Arc<TransferPipeline>,
    pub(crate) reaper: Arc<Reaper>,
    pub(crate) reporter: Reporter,
    /// How long a finished task stays queryable.
    pub(crate) reap_delay: Duration,
    /// Pause after a job that crashed the pipeline.
    pub(crate) backoff: Duration,
}

impl WorkerLoop {
    /// Drains the queue until `shutdown` flips to true (or its sender is
    /// dropped). A job that is executing when shutdown arrives runs to its end.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("worker loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.queue.wait_non_empty() => {}
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                    continue;
                }
            }
            let Some((_active, entry)) = self.queue.try_claim() else {
                tokio::task::yield_now().await;
                continue;
            };
            self.run_one(entry).await;
        }
        tracing::info!("worker loop stopped");
    }

    async fn run_one(&self, entry: QueueEntry) {
        let task_id = entry.task_id;
        tracing::info!(task_id = %task_id, pending = self.queue.depth(), "starting job");

        let pipeline = Arc::clone(&self.pipeline);
        let execution =
            tokio::spawn(async move { pipeline.execute(entry.task_id, entry.source).await });

        match execution.await {
            Ok(outcome) => self.announce(task_id, &outcome),
            Err(e) => {
                tracing::error!(task_id = %task_id, "job crashed: {}", e);
                let outcome = TerminalOutcome::Failed(format!("internal error: {}", e));
                if let Err(err) = self.registry.finish(task_id, &outcome) {
                    tracing::warn!(task_id = %task_id, "could not record failure: {}", err);
                }
                self.announce(task_id, &outcome);
                tokio::time::sleep(self.backoff).await;
            }
        }
    }

    /// Emits the single terminal update for the task and schedules its removal.
    fn announce(&self, task_id: TaskId, outcome: &TerminalOutcome) {
        let Some(task) = self.registry.get(task_id) else {
            tracing::warn!(task_id = %task_id, "finished task vanished before announcement");
            return;
        };
        let detail = match outcome {
            TerminalOutcome::Completed(id) => StatusDetail::Remote(id.clone()),
            TerminalOutcome::Failed(msg) => StatusDetail::Diagnostic(msg.clone()),
            TerminalOutcome::Cancelled => StatusDetail::None,
        };
        tracing::info!(task_id = %task_id, status = %task.status, "job finished");
        self.reporter.emit(&task, task.status, detail);
        self.reaper.schedule_removal(task.id, task.owner, self.reap_delay);
    }
}
