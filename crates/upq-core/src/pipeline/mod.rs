//! Two-stage transfer pipeline: fetch the source into a scoped temp file,
//! then push that file to the remote store.
//!
//! The cancellation token is consulted at four checkpoints: before the fetch
//! starts, at every fetch progress report, before the push starts, and on
//! every poll tick while the push call is in flight. A push that is already
//! dispatched is not interrupted; once the token is seen the pipeline stops
//! waiting for it and reports Cancelled, whatever the remote side ends up
//! doing with the write.

mod progress;
mod source;
mod store;
mod temp;

pub use progress::{Checkpoint, ProgressTracker, UNKNOWN_TOTAL_STEP};
pub use source::{FileSource, HttpSource, ProgressFn, Source};
pub use store::{classify_response, HttpStore, PushResponse, RemoteStore};
pub use temp::ScopedTempFile;

use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;

use crate::control::CancellationToken;
use crate::error::TransferError;
use crate::notify::{Reporter, StatusDetail};
use crate::task::{Task, TaskId, TaskRegistry, TaskStatus, TerminalOutcome};

/// Timing and placement knobs of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Checkpoint interval while waiting for the push call.
    pub poll_interval: Duration,
    /// Delay before the single temp-file delete retry.
    pub release_retry_delay: Duration,
    /// Directory for temp files; system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            release_retry_delay: Duration::from_secs(1),
            temp_dir: None,
        }
    }
}

pub struct TransferPipeline {
    registry: Arc<TaskRegistry>,
    store: Arc<dyn RemoteStore>,
    reporter: Reporter,
    settings: PipelineSettings,
}

impl TransferPipeline {
    pub fn new(
        registry: Arc<TaskRegistry>,
        store: Arc<dyn RemoteStore>,
        reporter: Reporter,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            registry,
            store,
            reporter,
            settings,
        }
    }

    /// Runs one task to a terminal outcome and records it in the registry.
    /// Stage errors never escape; they become `Failed` with a diagnostic.
    pub async fn execute(&self, task_id: TaskId, source: Box<dyn Source>) -> TerminalOutcome {
        let Some(task) = self.registry.get(task_id) else {
            return TerminalOutcome::Failed(format!("task {} is no longer registered", task_id));
        };

        let outcome = match self.run_stages(&task, source).await {
            Ok(identifier) => TerminalOutcome::Completed(identifier),
            Err(TransferError::Aborted) => TerminalOutcome::Cancelled,
            Err(e) if task.token.is_cancelled() => {
                tracing::debug!(task_id = %task.id, "stage error after cancel request: {}", e);
                TerminalOutcome::Cancelled
            }
            Err(e) => TerminalOutcome::Failed(e.to_string()),
        };
        self.commit(&task, outcome)
    }

    fn commit(&self, task: &Task, outcome: TerminalOutcome) -> TerminalOutcome {
        match self.registry.finish(task.id, &outcome) {
            Ok(()) => outcome,
            Err(e) if outcome != TerminalOutcome::Cancelled => {
                // A cancel request landed after the last checkpoint; it wins.
                tracing::warn!(task_id = %task.id, "{}; recording Cancelled instead", e);
                if let Err(e) = self.registry.finish(task.id, &TerminalOutcome::Cancelled) {
                    tracing::warn!(task_id = %task.id, "could not record outcome: {}", e);
                }
                TerminalOutcome::Cancelled
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, "could not record outcome: {}", e);
                outcome
            }
        }
    }

    async fn run_stages(&self, task: &Task, source: Box<dyn Source>) -> Result<String, TransferError> {
        checkpoint(&task.token)?;
        self.advance(task, TaskStatus::Downloading)?;

        let temp = ScopedTempFile::create(
            self.settings.temp_dir.as_deref(),
            &source.suffix(),
            self.settings.release_retry_delay,
        )?;
        let result = self.transfer(task, source, &temp).await;
        temp.release().await;
        result
    }

    async fn transfer(
        &self,
        task: &Task,
        source: Box<dyn Source>,
        temp: &ScopedTempFile,
    ) -> Result<String, TransferError> {
        let bytes = self.fetch(task, source, temp).await?;
        tracing::debug!(task_id = %task.id, bytes, "fetch finished");

        checkpoint(&task.token)?;
        self.advance(task, TaskStatus::Uploading)?;

        let response = self.push(task, temp).await?;
        classify_response(&response, self.store.identifier_field())
    }

    async fn fetch(
        &self,
        task: &Task,
        source: Box<dyn Source>,
        temp: &ScopedTempFile,
    ) -> Result<u64, TransferError> {
        let file = temp.open_writer()?;
        let task = task.clone();
        let registry = Arc::clone(&self.registry);
        let reporter = self.reporter.clone();
        tokio::task::spawn_blocking(move || -> Result<u64, TransferError> {
            let mut out = BufWriter::new(file);
            let mut tracker = ProgressTracker::new();
            let mut on_progress = |done: u64, total: Option<u64>| -> bool {
                let Some(cp) = tracker.observe(done, total) else {
                    return true;
                };
                if task.token.is_cancelled() {
                    return false;
                }
                match cp.percent {
                    // Emitted under the registry lock; false once a cancel moved the task on.
                    Some(pct) => registry.inspect_if(task.id, TaskStatus::Downloading, |t| {
                        reporter.emit(t, TaskStatus::Downloading, StatusDetail::Progress(pct))
                    }),
                    None => true,
                }
            };
            let n = source.fetch(&mut out, &mut on_progress)?;
            out.flush()?;
            out.get_ref().sync_all()?;
            Ok(n)
        })
        .await
        .unwrap_or_else(|e| Err(join_failure("fetch", e)))
    }

    async fn push(&self, task: &Task, temp: &ScopedTempFile) -> Result<PushResponse, TransferError> {
        let store = Arc::clone(&self.store);
        let path = temp.path().to_path_buf();
        let name = task.name.clone();
        let mut call = tokio::task::spawn_blocking(move || store.push(&path, &name));

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                res = &mut call => {
                    return res.unwrap_or_else(|e| Err(join_failure("push", e)));
                }
                _ = ticker.tick() => {
                    if task.token.is_cancelled() {
                        tracing::info!(task_id = %task.id, "abandoning in-flight push after cancel request");
                        return Err(TransferError::Aborted);
                    }
                }
            }
        }
    }

    fn advance(&self, task: &Task, next: TaskStatus) -> Result<(), TransferError> {
        let reporter = &self.reporter;
        match self
            .registry
            .transition_with(task.id, next, |t| reporter.emit(t, next, StatusDetail::None))
        {
            Ok(()) => Ok(()),
            Err(_) if task.token.is_cancelled() => Err(TransferError::Aborted),
            Err(e) => Err(e.into()),
        }
    }
}

fn checkpoint(token: &CancellationToken) -> Result<(), TransferError> {
    if token.is_cancelled() {
        Err(TransferError::Aborted)
    } else {
        Ok(())
    }
}

/// A panicking stage is re-raised so the worker loop's catch-all sees it.
fn join_failure(stage: &str, e: JoinError) -> TransferError {
    match e.try_into_panic() {
        Ok(payload) => std::panic::resume_unwind(payload),
        Err(e) => TransferError::Transport(format!("{} task join: {}", stage, e)),
    }
}
