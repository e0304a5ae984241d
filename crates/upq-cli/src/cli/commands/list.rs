//! `upq list` – show the caller's tasks.

use anyhow::Result;
use std::path::Path;
use upq_core::task::OwnerId;

use super::print_reply;
use crate::cli::control_socket::{self, Request};

pub async fn run_list(socket: &Path, owner: OwnerId) -> Result<()> {
    let reply = control_socket::send_command(socket, &Request::List { owner }).await?;
    print_reply(&reply);
    Ok(())
}
