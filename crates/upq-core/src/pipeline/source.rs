//! Fetch-stage sources: where a task's content comes from.
//!
//! Sources are blocking and run on a blocking thread. They stream into the
//! writer they are given and call `progress(bytes_done, total)` as bytes
//! arrive; when the callback returns false they stop and return
//! [`TransferError::Aborted`].

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TransferError;

/// Progress callback handed to [`Source::fetch`]. Returns false to stop.
pub type ProgressFn<'a> = dyn FnMut(u64, Option<u64>) -> bool + 'a;

pub trait Source: Send {
    /// Streams the content into `out`. Returns the number of bytes written.
    fn fetch(&self, out: &mut dyn Write, progress: &mut ProgressFn<'_>) -> Result<u64, TransferError>;

    /// Extension (with leading dot) for the temp file, or "".
    fn suffix(&self) -> String {
        String::new()
    }
}

const COPY_CHUNK: usize = 64 * 1024;

/// Reads a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Source for FileSource {
    fn fetch(&self, out: &mut dyn Write, progress: &mut ProgressFn<'_>) -> Result<u64, TransferError> {
        let mut file = File::open(&self.path)
            .map_err(|e| TransferError::Transport(format!("open {}: {}", self.path.display(), e)))?;
        let total = file.metadata().ok().map(|m| m.len());
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut done = 0u64;
        if !progress(0, total) {
            return Err(TransferError::Aborted);
        }
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(TransferError::Transport(format!(
                        "read {}: {}",
                        self.path.display(),
                        e
                    )))
                }
            };
            out.write_all(&buf[..n])?;
            done += n as u64;
            if !progress(done, total) {
                return Err(TransferError::Aborted);
            }
        }
        Ok(done)
    }

    fn suffix(&self) -> String {
        extension_suffix(&self.path)
    }
}

/// Downloads a URL with a single GET.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Source for HttpSource {
    fn fetch(&self, out: &mut dyn Write, progress: &mut ProgressFn<'_>) -> Result<u64, TransferError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(&self.url)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(Duration::from_secs(30))?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        easy.progress(true)?;

        let written = Cell::new(0u64);
        let aborted = Cell::new(false);
        let write_error: RefCell<Option<io::Error>> = RefCell::new(None);
        let perform = {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| match out.write_all(data) {
                Ok(()) => {
                    written.set(written.get() + data.len() as u64);
                    Ok(data.len())
                }
                Err(e) => {
                    *write_error.borrow_mut() = Some(e);
                    Ok(0) // abort transfer
                }
            })?;
            transfer.progress_function(|dltotal, _dlnow, _, _| {
                let total = (dltotal > 0.0).then_some(dltotal as u64);
                if progress(written.get(), total) {
                    true
                } else {
                    aborted.set(true);
                    false
                }
            })?;
            transfer.perform()
        };

        if aborted.get() {
            return Err(TransferError::Aborted);
        }
        if let Some(e) = write_error.into_inner() {
            return Err(TransferError::Resource(e));
        }
        perform?;

        let code = easy.response_code()?;
        if !(200..300).contains(&code) {
            return Err(TransferError::Transport(format!(
                "GET {} returned HTTP {}",
                self.url, code
            )));
        }
        Ok(written.get())
    }

    fn suffix(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut s| s.next_back().map(str::to_string))
            })
            .map(|last| extension_suffix(Path::new(&last)))
            .unwrap_or_default()
    }
}

fn extension_suffix(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}
