//! CLI for the UPQ transfer queue.

mod commands;
mod control_socket;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use upq_core::task::{OwnerId, TaskId};

use commands::{run_cancel, run_cancel_all, run_daemon, run_list, run_queue, run_submit};

/// Top-level CLI for the UPQ transfer queue.
#[derive(Debug, Parser)]
#[command(name = "upq")]
#[command(about = "UPQ: serial fetch-then-upload transfer queue", long_about = None)]
pub struct Cli {
    /// Act on behalf of this owner id (defaults to the current uid).
    #[arg(long, global = true, default_value_t = default_owner())]
    pub owner: i64,

    /// Control socket path (defaults to $XDG_RUNTIME_DIR/upq/control.sock).
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the queue: worker loop plus control socket, until Ctrl-C.
    Daemon {
        /// Only log status updates instead of printing them.
        #[arg(long)]
        quiet: bool,
    },

    /// Queue a file or an http(s) URL for upload.
    Submit {
        /// Local path or http(s) URL.
        source: String,
        /// Display name sent to the remote store.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show how many jobs are waiting.
    Queue,

    /// List your tasks.
    List,

    /// Cancel one of your tasks by its ID.
    Cancel {
        /// Task identifier.
        id: u64,
    },

    /// Cancel all of your unfinished tasks.
    CancelAll,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let owner = OwnerId(cli.owner);
        let socket = match cli.socket {
            Some(path) => path,
            None => upq_core::control::default_control_socket_path()?,
        };

        match cli.command {
            CliCommand::Daemon { quiet } => run_daemon(&socket, quiet).await?,
            CliCommand::Submit { source, name } => {
                run_submit(&socket, owner, &source, name.as_deref()).await?
            }
            CliCommand::Queue => run_queue(&socket).await?,
            CliCommand::List => run_list(&socket, owner).await?,
            CliCommand::Cancel { id } => run_cancel(&socket, owner, TaskId(id)).await?,
            CliCommand::CancelAll => run_cancel_all(&socket, owner).await?,
        }

        Ok(())
    }
}

#[cfg(unix)]
fn default_owner() -> i64 {
    // SAFETY: getuid has no preconditions and cannot fail.
    i64::from(unsafe { libc::getuid() })
}

#[cfg(not(unix))]
fn default_owner() -> i64 {
    0
}

#[cfg(test)]
mod tests;
