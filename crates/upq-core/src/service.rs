//! Caller-facing operations: submit, queue depth, list, cancel, cancel all.
//!
//! `TransferService` owns the registry, queue, pipeline and reaper and hands
//! out the worker loop. None of its operations wait for a pipeline run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::UpqConfig;
use crate::error::CommandError;
use crate::notify::{Reporter, StatusDetail, StatusSink};
use crate::pipeline::{PipelineSettings, RemoteStore, Source, TransferPipeline};
use crate::queue::{QueueEntry, SubmissionQueue, WorkerLoop};
use crate::reaper::Reaper;
use crate::task::{OwnerId, Task, TaskId, TaskRegistry, TaskStatus};

/// Display name used when the caller gives none.
pub const DEFAULT_DISPLAY_NAME: &str = "unknown_file";

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub pipeline: PipelineSettings,
    pub reap_delay: Duration,
    pub worker_backoff: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from(&UpqConfig::default())
    }
}

impl From<&UpqConfig> for ServiceSettings {
    fn from(cfg: &UpqConfig) -> Self {
        Self {
            pipeline: cfg.pipeline_settings(),
            reap_delay: cfg.reap_delay(),
            worker_backoff: cfg.worker_backoff(),
        }
    }
}

/// Answer to a submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub task_id: TaskId,
    /// Jobs ahead of this one, counting the one executing.
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Token set; the task had this status before the request.
    Requested { previous: TaskStatus },
    /// Task already finished; nothing changed.
    AlreadyFinished(TaskStatus),
}

pub struct TransferService {
    registry: Arc<TaskRegistry>,
    queue: Arc<SubmissionQueue>,
    pipeline: Arc<TransferPipeline>,
    reaper: Arc<Reaper>,
    reporter: Reporter,
    settings: ServiceSettings,
    worker_started: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl TransferService {
    pub fn new(
        settings: ServiceSettings,
        store: Arc<dyn RemoteStore>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let registry = Arc::new(TaskRegistry::new());
        let queue = Arc::new(SubmissionQueue::new());
        let reporter = Reporter::new(sink, Arc::clone(&queue));
        let pipeline = Arc::new(TransferPipeline::new(
            Arc::clone(&registry),
            store,
            reporter.clone(),
            settings.pipeline.clone(),
        ));
        let reaper = Arc::new(Reaper::new(Arc::clone(&registry)));
        let (shutdown, _) = watch::channel(false);
        Self {
            registry,
            queue,
            pipeline,
            reaper,
            reporter,
            settings,
            worker_started: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Spawns the worker loop. Only the first call starts one; later calls
    /// return `None`.
    pub fn spawn_worker(&self) -> Option<JoinHandle<()>> {
        if self.worker_started.swap(true, Ordering::AcqRel) {
            tracing::warn!("worker already running; not starting another");
            return None;
        }
        let worker = WorkerLoop {
            queue: Arc::clone(&self.queue),
            registry: Arc::clone(&self.registry),
            pipeline: Arc::clone(&self.pipeline),
            reaper: Arc::clone(&self.reaper),
            reporter: self.reporter.clone(),
            reap_delay: self.settings.reap_delay,
            backoff: self.settings.worker_backoff,
        };
        Some(tokio::spawn(worker.run(self.shutdown.subscribe())))
    }

    /// Registers a new task and queues it. Returns immediately.
    pub fn submit(&self, owner: OwnerId, source: Box<dyn Source>, name: &str) -> Submission {
        let name = match name.trim() {
            "" => DEFAULT_DISPLAY_NAME,
            n => n,
        };
        // The Queued notice goes out before the worker can claim the entry or
        // a cancel can reach the task.
        let (position, task_id) = self.queue.enqueue_with(|position| {
            let task_id = self.registry.register_with(owner, name, |task| {
                self.reporter.emit(task, TaskStatus::Queued, StatusDetail::Position(position))
            });
            QueueEntry { task_id, source }
        });
        tracing::info!(task_id = %task_id, owner = %owner, position, "job queued: {}", name);
        Submission { task_id, position }
    }

    /// Jobs waiting to start.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn get(&self, task_id: TaskId) -> Option<Task> {
        self.registry.get(task_id)
    }

    /// `owner`'s tasks in submission order.
    pub fn list(&self, owner: OwnerId) -> Vec<Task> {
        self.registry.list_by_owner(owner)
    }

    /// Requests cancellation of one of `owner`'s tasks.
    pub fn cancel(&self, owner: OwnerId, task_id: TaskId) -> Result<CancelOutcome, CommandError> {
        let previous = self.registry.request_cancel_with(task_id, owner, |task| {
            self.reporter.emit(task, TaskStatus::Cancelling, StatusDetail::None)
        })?;
        if previous.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished(previous));
        }
        tracing::info!(task_id = %task_id, owner = %owner, was = %previous, "cancel requested");
        Ok(CancelOutcome::Requested { previous })
    }

    /// Requests cancellation of every unfinished task of `owner`. Returns how
    /// many tasks were affected.
    pub fn cancel_all(&self, owner: OwnerId) -> usize {
        self.registry
            .owned_ids(owner)
            .into_iter()
            .filter(|id| matches!(self.cancel(owner, *id), Ok(CancelOutcome::Requested { .. })))
            .count()
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn reaper(&self) -> &Arc<Reaper> {
        &self.reaper
    }

    /// Stops the worker after its current job and drops pending reapers. Tasks
    /// that finish after this call are not scheduled for removal.
    /// Returns how many reapers were abandoned.
    pub fn shutdown(&self) -> usize {
        let _ = self.shutdown.send(true);
        let abandoned = self.reaper.close();
        tracing::info!(abandoned, "service shut down");
        abandoned
    }
}
