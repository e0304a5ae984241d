//! Task control: the per-task cancellation token and the control socket location.
//!
//! Each task owns one `CancellationToken`. A cancel request (from the control
//! socket or any other caller) sets it; the transfer pipeline consults it at
//! its checkpoints and stops there. Setting it never interrupts work that is
//! already past a checkpoint.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Settable-once cancellation signal shared between the task record, the
/// pipeline and the blocking stage threads. Once set it stays set.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Default path for the daemon's control socket (XDG runtime dir, else state dir).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dirs = xdg::BaseDirectories::with_prefix("upq")?;
    let dir = dirs
        .get_runtime_directory()
        .map(|d| d.join("upq"))
        .unwrap_or_else(|_| dirs.get_state_home());
    Ok(dir.join("control.sock"))
}
