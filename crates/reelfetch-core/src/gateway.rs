//! Torrent gateway
//!
//! Hands torrents to the daemon and waits for them to finish. Magnet links
//! are passed through; anything else is fetched over HTTP, staged in a
//! single temp slot and submitted by path.

use crate::config::Config;
use crate::error::{MonitorError, RpcError, SubmissionError};
use crate::shutdown::Shutdown;
use crate::types::TorrentHandle;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Operations the pipeline needs from a torrent daemon
#[async_trait]
pub trait TorrentDaemon: Send + Sync {
    /// Add a magnet link, saving into `download_dir`
    async fn add_magnet(&self, uri: &str, download_dir: &Path) -> Result<TorrentHandle, RpcError>;

    /// Add a `.torrent` file readable by the daemon at `path`
    async fn add_file(&self, path: &Path, download_dir: &Path) -> Result<TorrentHandle, RpcError>;

    /// Current state of a torrent, `None` if the daemon no longer knows it
    async fn status(&self, id: i64) -> Result<Option<TorrentHandle>, RpcError>;

    /// Drop a torrent from the daemon's list
    async fn remove(&self, id: i64, delete_data: bool) -> Result<(), RpcError>;
}

/// Time source for polling
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Submits torrents and waits for completion
#[derive(Clone)]
pub struct TorrentGateway {
    daemon: Arc<dyn TorrentDaemon>,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
    download_dir: PathBuf,
    temp_path: PathBuf,
    poll_interval: Duration,
    completion_timeout: Option<Duration>,
    insecure_transport: bool,
}

impl TorrentGateway {
    pub fn new(
        daemon: Arc<dyn TorrentDaemon>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self, reqwest::Error> {
        if config.insecure_transport {
            log::warn!("TLS certificate validation is disabled for torrent file downloads");
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.http_timeout())
            .danger_accept_invalid_certs(config.insecure_transport)
            .build()?;

        Ok(Self {
            daemon,
            clock,
            http,
            download_dir: config.download_root.clone(),
            temp_path: config.temp_torrent_path(),
            poll_interval: config.poll_interval(),
            completion_timeout: config.completion_timeout(),
            insecure_transport: config.insecure_transport,
        })
    }

    pub fn daemon(&self) -> &Arc<dyn TorrentDaemon> {
        &self.daemon
    }

    /// Whether `.torrent` downloads skip TLS certificate validation
    pub fn accepts_invalid_certs(&self) -> bool {
        self.insecure_transport
    }

    /// Hand `torrent_url` to the daemon
    pub async fn submit(&self, torrent_url: &str) -> Result<TorrentHandle, SubmissionError> {
        if torrent_url.starts_with("magnet:?") {
            return Ok(self
                .daemon
                .add_magnet(torrent_url, &self.download_dir)
                .await?);
        }

        let data = self.download_torrent_file(torrent_url).await?;
        let result = self.submit_staged(&data).await;
        self.remove_staged().await;
        result
    }

    async fn download_torrent_file(&self, url: &str) -> Result<Vec<u8>, SubmissionError> {
        let to_error = |source| SubmissionError::Download {
            url: url.to_string(),
            source,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(to_error)?;
        let body = response.bytes().await.map_err(to_error)?;
        Ok(body.to_vec())
    }

    async fn submit_staged(&self, data: &[u8]) -> Result<TorrentHandle, SubmissionError> {
        tokio::fs::write(&self.temp_path, data)
            .await
            .map_err(|source| SubmissionError::Stage {
                path: self.temp_path.clone(),
                source,
            })?;

        Ok(self
            .daemon
            .add_file(&self.temp_path, &self.download_dir)
            .await?)
    }

    async fn remove_staged(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove staged torrent {:?}: {}", self.temp_path, e);
            }
        }
    }

    /// Poll until the torrent reaches 100%, then remove it from the daemon
    /// while keeping its data.
    ///
    /// Any failed poll ends the wait. So does the configured timeout or a
    /// shutdown request.
    pub async fn await_completion(
        &self,
        handle: &TorrentHandle,
        shutdown: &Shutdown,
    ) -> Result<TorrentHandle, MonitorError> {
        log::info!("Starting download of: {}", handle.name);
        let started = self.clock.now();

        loop {
            let status = self
                .daemon
                .status(handle.id)
                .await?
                .ok_or(MonitorError::Missing(handle.id))?;

            if status.is_complete() {
                log::info!("Download complete for: {}", status.name);
                self.daemon.remove(handle.id, false).await?;
                return Ok(status);
            }

            log::debug!("{}: {:.1}%", status.name, status.progress);

            if let Some(limit) = self.completion_timeout {
                let waited = self.clock.now().saturating_duration_since(started);
                if waited >= limit {
                    return Err(MonitorError::TimedOut {
                        name: status.name,
                        waited,
                    });
                }
            }

            tokio::select! {
                _ = self.clock.sleep(self.poll_interval) => {}
                _ = shutdown.wait() => return Err(MonitorError::Cancelled),
            }
        }
    }
}
