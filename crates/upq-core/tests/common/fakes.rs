//! In-process sources, stores and sinks for driving the service in tests.
//!
//! Sources and stores run on blocking threads; a [`Gate`] parks them at a
//! known point until the test releases them.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use upq_core::error::TransferError;
use upq_core::notify::{StatusSink, StatusUpdate};
use upq_core::pipeline::{ProgressFn, PushResponse, RemoteStore, Source};
use upq_core::task::{TaskId, TaskStatus};

/// How long a parked stage waits for release before moving on by itself.
const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking side of a gate, held by a fake stage.
pub struct Gate {
    reached: mpsc::UnboundedSender<()>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

/// Test side of a gate.
pub struct GateHandle {
    reached: mpsc::UnboundedReceiver<()>,
    release: std_mpsc::Sender<()>,
}

pub fn gate() -> (Gate, GateHandle) {
    let (reached_tx, reached_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    (
        Gate {
            reached: reached_tx,
            release: Mutex::new(release_rx),
        },
        GateHandle {
            reached: reached_rx,
            release: release_tx,
        },
    )
}

impl Gate {
    fn pass(&self) {
        let _ = self.reached.send(());
        let release = self.release.lock().unwrap();
        let _ = release.recv_timeout(GATE_TIMEOUT);
    }
}

impl GateHandle {
    /// Waits until the stage is parked at the gate.
    pub async fn reached(&mut self) {
        tokio::time::timeout(GATE_TIMEOUT, self.reached.recv())
            .await
            .expect("stage never reached the gate")
            .expect("gate dropped");
    }

    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

/// Writes a fixed body in pieces (two by default) with a progress report
/// after each, optionally parking at a gate after the first.
pub struct ScriptedSource {
    body: Vec<u8>,
    pieces: usize,
    gate: Option<Gate>,
    fetches: Arc<AtomicUsize>,
    explode: bool,
}

impl ScriptedSource {
    pub fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            pieces: 2,
            gate: None,
            fetches: Arc::default(),
            explode: false,
        }
    }

    /// A source that panics as soon as it is fetched.
    pub fn exploding() -> Self {
        Self {
            explode: true,
            ..Self::new(b"")
        }
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn in_pieces(mut self, pieces: usize) -> Self {
        self.pieces = pieces.max(1);
        self
    }

    pub fn counting(mut self, fetches: &Arc<AtomicUsize>) -> Self {
        self.fetches = Arc::clone(fetches);
        self
    }
}

impl Source for ScriptedSource {
    fn fetch(&self, out: &mut dyn Write, progress: &mut ProgressFn<'_>) -> Result<u64, TransferError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.explode {
            panic!("source exploded");
        }
        let total = self.body.len() as u64;
        let piece = self.body.len().div_ceil(self.pieces).max(1);
        let mut written = 0;
        for (i, chunk) in self.body.chunks(piece).enumerate() {
            out.write_all(chunk)?;
            written += chunk.len() as u64;
            if !progress(written, Some(total)) {
                return Err(TransferError::Aborted);
            }
            if i == 0 {
                if let Some(gate) = &self.gate {
                    gate.pass();
                }
            }
        }
        Ok(total)
    }

    fn suffix(&self) -> String {
        ".bin".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedFile {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Records every pushed file and answers with a canned response.
pub struct RecordingStore {
    response: PushResponse,
    gate: Option<Gate>,
    pushes: Mutex<Vec<PushedFile>>,
}

impl RecordingStore {
    pub fn accepting(identifier: &str) -> Self {
        Self::responding(200, &format!(r#"{{"msg":"ok","filecode":"{}"}}"#, identifier))
    }

    pub fn responding(status: u32, body: &str) -> Self {
        Self {
            response: PushResponse {
                status,
                body: body.to_string(),
            },
            gate: None,
            pushes: Mutex::default(),
        }
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn pushes(&self) -> Vec<PushedFile> {
        self.pushes.lock().unwrap().clone()
    }
}

impl RemoteStore for RecordingStore {
    fn push(&self, file: &Path, display_name: &str) -> Result<PushResponse, TransferError> {
        let contents = std::fs::read(file)?;
        self.pushes.lock().unwrap().push(PushedFile {
            name: display_name.to_string(),
            contents,
        });
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        Ok(self.response.clone())
    }
}

/// Keeps every update in emission order.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingSink {
    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn updates_for(&self, task_id: TaskId) -> Vec<StatusUpdate> {
        self.updates()
            .into_iter()
            .filter(|u| u.task_id == task_id)
            .collect()
    }

    /// Status sequence of one task with repeats (progress steps) collapsed.
    pub fn statuses(&self, task_id: TaskId) -> Vec<TaskStatus> {
        let mut seq: Vec<TaskStatus> = Vec::new();
        for update in self.updates_for(task_id) {
            if seq.last() != Some(&update.status) {
                seq.push(update.status);
            }
        }
        seq
    }

    pub fn terminal_updates(&self, task_id: TaskId) -> usize {
        self.updates_for(task_id)
            .iter()
            .filter(|u| u.status.is_terminal())
            .count()
    }
}

impl StatusSink for RecordingSink {
    fn on_status_changed(&self, update: &StatusUpdate) {
        self.updates.lock().unwrap().push(update.clone());
    }
}
