//! Scoped temporary file that holds fetched content until the push is done.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Temp file owned by one pipeline execution.
///
/// `release` deletes it, retrying once after `retry_delay` and then giving up
/// with a warning. If the guard is dropped without `release` (panic path) the
/// file is deleted once on drop.
#[derive(Debug)]
pub struct ScopedTempFile {
    path: Option<PathBuf>,
    retry_delay: Duration,
}

impl ScopedTempFile {
    /// Creates an empty file named `upq-XXXX<suffix>` in `dir` (system temp dir if `None`).
    pub fn create(dir: Option<&Path>, suffix: &str, retry_delay: Duration) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upq-").suffix(suffix);
        let named = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (_file, path) = named.keep().map_err(|e| e.error)?;
        tracing::debug!(path = %path.display(), "created temp file");
        Ok(Self {
            path: Some(path),
            retry_delay,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Opens the file for writing from the start.
    pub fn open_writer(&self) -> io::Result<File> {
        File::options().write(true).truncate(true).open(self.path())
    }

    /// Deletes the file. Returns false when it could not be removed even after
    /// the retry; the failure is logged and otherwise ignored.
    pub async fn release(mut self) -> bool {
        let Some(path) = self.path.take() else {
            return true;
        };
        match remove(&path).await {
            Ok(()) => return true,
            Err(e) => {
                tracing::warn!(path = %path.display(), "temp file delete failed, retrying: {}", e)
            }
        }
        tokio::time::sleep(self.retry_delay).await;
        match remove(&path).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), "could not delete temporary file: {}", e);
                false
            }
        }
    }
}

async fn remove(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl Drop for ScopedTempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => {
                    tracing::warn!(path = %path.display(), "could not delete temporary file: {}", e)
                }
                _ => tracing::debug!(path = %path.display(), "temp file removed on drop"),
            }
        }
    }
}
