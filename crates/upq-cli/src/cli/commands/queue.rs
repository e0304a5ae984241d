//! `upq queue` – show how many jobs wait behind the current one.

use anyhow::Result;
use std::path::Path;

use super::print_reply;
use crate::cli::control_socket::{self, Request};

pub async fn run_queue(socket: &Path) -> Result<()> {
    let reply = control_socket::send_command(socket, &Request::Queue).await?;
    print_reply(&reply);
    Ok(())
}
