#![allow(dead_code)]

pub mod fakes;
pub mod http_server;

use std::time::Duration;

use upq_core::pipeline::PipelineSettings;
use upq_core::service::ServiceSettings;

/// Short real-time settings for service tests. Temp files go to `temp_dir`.
pub fn fast_settings(temp_dir: &std::path::Path) -> ServiceSettings {
    ServiceSettings {
        pipeline: PipelineSettings {
            poll_interval: Duration::from_millis(20),
            release_retry_delay: Duration::from_millis(10),
            temp_dir: Some(temp_dir.to_path_buf()),
        },
        reap_delay: Duration::from_secs(60),
        worker_backoff: Duration::from_millis(20),
    }
}

/// Polls `cond` every 10ms until it holds; panics after 5s.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn dir_is_empty(dir: &std::path::Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
