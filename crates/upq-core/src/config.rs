use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::PipelineSettings;

/// Environment variable that overrides `api_key` from the config file.
pub const API_KEY_ENV: &str = "UPQ_API_KEY";

/// Global configuration loaded from `~/.config/upq/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpqConfig {
    /// Upload endpoint of the remote store.
    pub upload_url: String,
    /// API key sent as the `api_key` query parameter.
    pub api_key: Option<String>,
    /// JSON field of a successful upload response that holds the remote id.
    pub identifier_field: String,
    /// Cancellation poll interval while the push call is running (milliseconds).
    pub poll_interval_ms: u64,
    /// Grace period before a finished task is evicted (seconds).
    pub reap_delay_secs: u64,
    /// Pause after a job crashes the pipeline (seconds).
    pub worker_backoff_secs: u64,
    /// Delay before the single retry of a failed temp-file delete (milliseconds).
    pub release_retry_delay_ms: u64,
    /// Total timeout of one push call (seconds).
    pub upload_timeout_secs: u64,
    /// Directory for temp files; system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

impl Default for UpqConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://api.streamup.cc/v1/upload".to_string(),
            api_key: None,
            identifier_field: "filecode".to_string(),
            poll_interval_ms: 1000,
            reap_delay_secs: 300,
            worker_backoff_secs: 5,
            release_retry_delay_ms: 1000,
            upload_timeout_secs: 3600,
            temp_dir: None,
        }
    }
}

impl UpqConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn reap_delay(&self) -> Duration {
        Duration::from_secs(self.reap_delay_secs)
    }

    pub fn worker_backoff(&self) -> Duration {
        Duration::from_secs(self.worker_backoff_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            poll_interval: self.poll_interval(),
            release_retry_delay: Duration::from_millis(self.release_retry_delay_ms),
            temp_dir: self.temp_dir.clone(),
        }
    }

    /// Applies environment overrides (currently only the API key).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = Some(key.trim().to_string());
            }
        }
        self
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("upq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UpqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UpqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg.with_env_overrides());
    }

    let data = fs::read_to_string(&path)?;
    let cfg: UpqConfig = toml::from_str(&data)?;
    Ok(cfg.with_env_overrides())
}
