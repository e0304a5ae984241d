//! Push-stage remote store and response classification.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;

use crate::config::UpqConfig;
use crate::error::TransferError;

/// Raw answer of the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    pub status: u32,
    pub body: String,
}

/// Remote store that accepts one file per call. `push` may block for the
/// whole upload and is run on a blocking thread.
pub trait RemoteStore: Send + Sync {
    fn push(&self, file: &Path, display_name: &str) -> Result<PushResponse, TransferError>;

    /// JSON field of a success body that carries the remote identifier.
    fn identifier_field(&self) -> &str {
        "filecode"
    }
}

/// Turns a push response into the remote identifier, or a rejection whose
/// text includes the raw body.
pub fn classify_response(resp: &PushResponse, identifier_field: &str) -> Result<String, TransferError> {
    if resp.status != 200 {
        return Err(TransferError::RemoteRejection(format!(
            "upload failed with status code {}: {}",
            resp.status, resp.body
        )));
    }
    let value: serde_json::Value = serde_json::from_str(&resp.body).map_err(|e| {
        TransferError::RemoteRejection(format!("error parsing response: {}: {}", e, resp.body))
    })?;
    match value.get(identifier_field) {
        Some(serde_json::Value::String(id)) if !id.trim().is_empty() => Ok(id.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(TransferError::RemoteRejection(format!(
            "upload error: {}",
            resp.body
        ))),
    }
}

/// Multipart HTTP upload (`file` form field) to an API endpoint authenticated
/// by an `api_key` query parameter.
#[derive(Debug, Clone)]
pub struct HttpStore {
    upload_url: url::Url,
    identifier_field: String,
    timeout: Duration,
}

impl HttpStore {
    pub fn new(upload_url: &str, api_key: Option<&str>, identifier_field: &str) -> anyhow::Result<Self> {
        let mut upload_url = url::Url::parse(upload_url)
            .with_context(|| format!("invalid upload url: {}", upload_url))?;
        if let Some(key) = api_key {
            upload_url.query_pairs_mut().append_pair("api_key", key);
        }
        Ok(Self {
            upload_url,
            identifier_field: identifier_field.to_string(),
            timeout: Duration::from_secs(3600),
        })
    }

    pub fn from_config(cfg: &UpqConfig) -> anyhow::Result<Self> {
        let mut store = Self::new(&cfg.upload_url, cfg.api_key.as_deref(), &cfg.identifier_field)?;
        store.timeout = cfg.upload_timeout();
        Ok(store)
    }

    pub fn upload_url(&self) -> &url::Url {
        &self.upload_url
    }
}

impl RemoteStore for HttpStore {
    fn push(&self, file: &Path, display_name: &str) -> Result<PushResponse, TransferError> {
        let mut form = curl::easy::Form::new();
        form.part("file")
            .file(file)
            .filename(display_name)
            .add()
            .map_err(|e| TransferError::Transport(format!("build upload form: {}", e)))?;

        let mut easy = curl::easy::Easy::new();
        easy.url(self.upload_url.as_str())?;
        easy.connect_timeout(Duration::from_secs(30))?;
        easy.timeout(self.timeout)?;
        easy.httppost(form)?;

        let mut body = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }
        let status = easy.response_code()?;
        Ok(PushResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    fn identifier_field(&self) -> &str {
        &self.identifier_field
    }
}
