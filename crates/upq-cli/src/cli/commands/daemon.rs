//! `upq daemon` – host the queue: worker loop, control socket, status output.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use upq_core::config;
use upq_core::notify::{ChannelSink, LogSink, StatusSink};
use upq_core::pipeline::HttpStore;
use upq_core::service::{ServiceSettings, TransferService};

use crate::cli::control_socket;

pub async fn run_daemon(socket: &Path, quiet: bool) -> Result<()> {
    let cfg = config::load_or_init()?;
    tracing::debug!("loaded config: {:?}", cfg);
    if cfg.api_key.is_none() {
        tracing::warn!("no api_key configured; uploads will likely be rejected");
    }
    let store = HttpStore::from_config(&cfg)?;

    let mut printer = None;
    let sink: Arc<dyn StatusSink> = if quiet {
        Arc::new(LogSink)
    } else {
        let (sink, mut rx) = ChannelSink::channel();
        printer = Some(tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                tracing::info!(task_id = %update.task_id, owner = %update.owner, "{}", update);
                println!("[{}] {}", update.owner, update);
            }
        }));
        Arc::new(sink)
    };

    let service = Arc::new(TransferService::new(
        ServiceSettings::from(&cfg),
        Arc::new(store),
        sink,
    ));
    let worker = service.spawn_worker();
    let listener = control_socket::spawn_control_listener(Arc::clone(&service), socket)?;
    tracing::info!(path = %socket.display(), "control socket listening");
    println!("upq daemon listening on {}", socket.display());

    tokio::signal::ctrl_c().await?;
    println!("shutting down; the job in progress will finish first (Ctrl-C again to abort)");
    listener.abort();
    let abandoned = service.shutdown();
    tracing::debug!(abandoned, "pending removals dropped");

    if let Some(worker) = worker {
        tokio::select! {
            _ = worker => {}
            _ = tokio::signal::ctrl_c() => tracing::warn!("second interrupt; not waiting for the current job"),
        }
    }
    if let Some(printer) = printer {
        printer.abort();
    }
    let _ = std::fs::remove_file(socket);
    Ok(())
}
