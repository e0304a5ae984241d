//! `upq cancel <id>` – request cancellation of one task.

use anyhow::{bail, Result};
use std::path::Path;
use upq_core::task::{OwnerId, TaskId};

use super::print_reply;
use crate::cli::control_socket::{self, Request};

pub async fn run_cancel(socket: &Path, owner: OwnerId, id: TaskId) -> Result<()> {
    let reply = control_socket::send_command(socket, &Request::Cancel { owner, id }).await?;
    if let Some(err) = reply.iter().find_map(|l| l.strip_prefix("error: ")) {
        bail!("{}", err);
    }
    print_reply(&reply);
    Ok(())
}
