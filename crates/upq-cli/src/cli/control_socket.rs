//! Control socket: server (during `upq daemon`) and client (every other command).
//! Protocol: one command per line; each reply is zero or more lines closed by
//! an empty line.
//!
//! ```text
//! submit <owner> <source> [name]
//! queue
//! list <owner>
//! cancel <owner> <id>
//! cancelall <owner>
//! ```

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use upq_core::pipeline::{FileSource, HttpSource, Source};
use upq_core::service::{CancelOutcome, TransferService};
use upq_core::task::{OwnerId, TaskId, TaskResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Submit {
        owner: OwnerId,
        source: String,
        name: Option<String>,
    },
    Queue,
    List {
        owner: OwnerId,
    },
    Cancel {
        owner: OwnerId,
        id: TaskId,
    },
    CancelAll {
        owner: OwnerId,
    },
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, String> {
        let (verb, rest) = next_word(line);
        match verb {
            "submit" => {
                let (owner, rest) = next_word(rest);
                let (source, rest) = next_word(rest);
                if source.is_empty() {
                    return Err("usage: submit <owner> <source> [name]".to_string());
                }
                let name = rest.trim();
                Ok(Request::Submit {
                    owner: parse_owner(owner)?,
                    source: source.to_string(),
                    name: (!name.is_empty()).then(|| name.to_string()),
                })
            }
            "queue" => Ok(Request::Queue),
            "list" => Ok(Request::List {
                owner: parse_owner(rest.trim())?,
            }),
            "cancel" => {
                let (owner, rest) = next_word(rest);
                let id = rest
                    .trim()
                    .parse::<TaskId>()
                    .map_err(|_| "usage: cancel <owner> <id>".to_string())?;
                Ok(Request::Cancel {
                    owner: parse_owner(owner)?,
                    id,
                })
            }
            "cancelall" => Ok(Request::CancelAll {
                owner: parse_owner(rest.trim())?,
            }),
            "" => Err("empty command".to_string()),
            other => Err(format!("unknown command: {}", other)),
        }
    }

    pub fn to_line(&self) -> String {
        match self {
            Request::Submit {
                owner,
                source,
                name: Some(name),
            } => format!("submit {} {} {}", owner, source, name),
            Request::Submit { owner, source, .. } => format!("submit {} {}", owner, source),
            Request::Queue => "queue".to_string(),
            Request::List { owner } => format!("list {}", owner),
            Request::Cancel { owner, id } => format!("cancel {} {}", owner, id),
            Request::CancelAll { owner } => format!("cancelall {}", owner),
        }
    }
}

fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    s.split_once(char::is_whitespace).unwrap_or((s, ""))
}

fn parse_owner(s: &str) -> Result<OwnerId, String> {
    s.parse::<i64>()
        .map(OwnerId)
        .map_err(|_| format!("invalid owner id: {:?}", s))
}

/// http(s) URLs are downloaded; anything else is read as a local path.
pub fn source_for(spec: &str) -> Box<dyn Source> {
    if spec.starts_with("http://") || spec.starts_with("https://") {
        Box::new(HttpSource::new(spec))
    } else {
        Box::new(FileSource::new(spec))
    }
}

/// Name shown to the remote store when the caller gives none: the last path
/// segment of the source.
fn default_name(spec: &str) -> &str {
    let path = spec.split(|c: char| c == '?' || c == '#').next().unwrap_or(spec);
    path.rsplit('/').next().unwrap_or("")
}

/// Runs one request against the service and renders the reply lines.
pub fn respond(service: &TransferService, request: Request) -> Vec<String> {
    match request {
        Request::Submit {
            owner,
            source,
            name,
        } => {
            let name = name.unwrap_or_else(|| default_name(&source).to_string());
            let sub = service.submit(owner, source_for(&source), &name);
            if sub.position == 0 {
                vec![format!("task {} queued, processing immediately", sub.task_id)]
            } else {
                vec![format!(
                    "task {} queued at position #{}",
                    sub.task_id,
                    sub.position + 1
                )]
            }
        }
        Request::Queue => vec![format!("{} job(s) waiting", service.queue_depth())],
        Request::List { owner } => {
            let tasks = service.list(owner);
            if tasks.is_empty() {
                return vec!["no tasks".to_string()];
            }
            let mut lines = vec![format!("{:<6} {:<14} {:<24} {}", "ID", "STATUS", "NAME", "RESULT")];
            lines.extend(tasks.into_iter().map(|t| {
                let result = match t.result {
                    Some(TaskResult::Remote(id)) => id,
                    Some(TaskResult::Diagnostic(msg)) => msg,
                    None => "-".to_string(),
                };
                format!("{:<6} {:<14} {:<24} {}", t.id, t.status.to_string(), t.name, result)
            }));
            lines
        }
        Request::Cancel { owner, id } => match service.cancel(owner, id) {
            Ok(CancelOutcome::Requested { previous }) => {
                vec![format!("cancel requested for task {} (was {})", id, previous)]
            }
            Ok(CancelOutcome::AlreadyFinished(status)) => {
                vec![format!("task {} already finished ({})", id, status)]
            }
            Err(e) => vec![format!("error: {}", e)],
        },
        Request::CancelAll { owner } => {
            vec![format!("cancel requested for {} task(s)", service.cancel_all(owner))]
        }
    }
}

/// Binds `path` and spawns a task that answers every connection line by line.
/// A stale socket file from a previous run is replaced.
pub fn spawn_control_listener(
    service: Arc<TransferService>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create socket dir {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(&service, stream).await {
                            tracing::debug!("control connection: {}", e);
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve_connection(service: &TransferService, stream: UnixStream) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let reply = match Request::parse(&line) {
            Ok(request) => {
                tracing::debug!(command = %request.to_line(), "control command");
                respond(service, request)
            }
            Err(msg) => vec![format!("error: {}", msg)],
        };
        let mut out = String::new();
        for l in reply {
            out.push_str(&l);
            out.push('\n');
        }
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Sends one request and collects the reply lines.
pub async fn send_command(socket_path: &Path, request: &Request) -> Result<Vec<String>> {
    if !socket_path.exists() {
        bail!(
            "no daemon listening at {} (start one with `upq daemon`)",
            socket_path.display()
        );
    }
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();
    write
        .write_all(format!("{}\n", request.to_line()).as_bytes())
        .await?;

    let mut reply = Vec::new();
    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            break;
        }
        reply.push(line);
    }
    Ok(reply)
}

/// Absolute form of a local source, so the daemon resolves it the same way
/// regardless of its working directory. URLs pass through.
pub fn resolve_source(spec: &str) -> Result<String> {
    if spec.starts_with("http://") || spec.starts_with("https://") {
        return Ok(spec.to_string());
    }
    let path: PathBuf = std::fs::canonicalize(spec).with_context(|| format!("source {}", spec))?;
    let resolved = path.to_string_lossy().into_owned();
    if resolved.contains(char::is_whitespace) {
        bail!("source path must not contain whitespace: {}", resolved);
    }
    Ok(resolved)
}
