//! `upq submit <source>` – queue a local file or URL for upload.

use anyhow::Result;
use std::path::Path;
use upq_core::task::OwnerId;

use super::print_reply;
use crate::cli::control_socket::{self, Request};

pub async fn run_submit(socket: &Path, owner: OwnerId, source: &str, name: Option<&str>) -> Result<()> {
    let request = Request::Submit {
        owner,
        source: control_socket::resolve_source(source)?,
        name: name.map(str::to_string),
    };
    let reply = control_socket::send_command(socket, &request).await?;
    print_reply(&reply);
    Ok(())
}
