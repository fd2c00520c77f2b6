//! Runtime configuration
//!
//! Everything the pipeline needs is carried in [`Config`] and handed to the
//! components at construction. The file format is JSON; missing keys fall
//! back to the defaults below.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_FEED_URL: &str = "https://yts.mx/rss/0/1080p/all/4/en";
const DEFAULT_DOWNLOAD_ROOT: &str = "/var/lib/transmission-daemon/downloads";
const LEDGER_FILE_NAME: &str = "download_history.json";
const TEMP_TORRENT_FILE_NAME: &str = "temp.torrent";

/// Browser-like user agent; some trackers refuse unknown clients
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// What to do with a torrent URL whose submission keeps failing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Try again on every cycle for as long as the feed lists it
    #[default]
    Retry,
    /// Stop trying after `max_failures` consecutive failures until restart
    Quarantine { max_failures: u32 },
}

/// Connection settings for the Transmission daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub rpc_path: String,
    pub username: String,
    pub password: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9091,
            rpc_path: "/transmission/rpc".to_string(),
            username: "transmission".to_string(),
            password: "transmission".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Full RPC endpoint URL
    pub fn rpc_url(&self) -> String {
        let path = if self.rpc_path.starts_with('/') {
            self.rpc_path.clone()
        } else {
            format!("/{}", self.rpc_path)
        };
        format!("http://{}:{}{}", self.host, self.port, path)
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RSS or Atom feed to poll
    pub feed_url: String,
    /// Literal substring a title must contain to be downloaded
    pub quality_tag: String,
    /// Directory the daemon downloads into
    pub download_root: PathBuf,
    /// Where finished video files are moved
    pub export_dir: PathBuf,
    /// Download history; defaults to `download_history.json` in the download root
    pub ledger_path: Option<PathBuf>,
    /// Staging slot for fetched `.torrent` files; defaults to `temp.torrent` in the download root
    pub temp_torrent_path: Option<PathBuf>,
    /// Append log records here instead of stderr
    pub log_file: Option<PathBuf>,
    /// File extensions (without the dot) treated as video
    pub video_extensions: Vec<String>,
    pub daemon: DaemonConfig,
    /// Skip TLS certificate validation when fetching `.torrent` files
    pub insecure_transport: bool,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Seconds between completion polls
    pub poll_interval_secs: u64,
    /// Give up on a single torrent after this many seconds
    pub completion_timeout_secs: Option<u64>,
    /// Seconds between feed checks
    pub feed_interval_secs: u64,
    /// Seconds to wait after a failed cycle
    pub recovery_interval_secs: u64,
    pub failure_policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        let export_dir = dirs::video_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join("Videos"));

        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            quality_tag: "[1080p]".to_string(),
            download_root: PathBuf::from(DEFAULT_DOWNLOAD_ROOT),
            export_dir,
            ledger_path: None,
            temp_torrent_path: None,
            log_file: None,
            video_extensions: vec!["mp4".to_string()],
            daemon: DaemonConfig::default(),
            insecure_transport: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 30,
            poll_interval_secs: 30,
            completion_timeout_secs: None,
            feed_interval_secs: 300,
            recovery_interval_secs: 60,
            failure_policy: FailurePolicy::Retry,
        }
    }
}

impl Config {
    /// Default config location, `<config dir>/reelfetch/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reelfetch")
            .join("config.json")
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the default location if it exists,
    /// else built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_path();
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_url.trim().is_empty() {
            return Err(ConfigError::Invalid("feed_url is empty".into()));
        }
        if self.quality_tag.is_empty() {
            return Err(ConfigError::Invalid("quality_tag is empty".into()));
        }
        for (name, secs) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("feed_interval_secs", self.feed_interval_secs),
            ("recovery_interval_secs", self.recovery_interval_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        if self.video_extensions.is_empty() {
            return Err(ConfigError::Invalid("video_extensions is empty".into()));
        }
        if let FailurePolicy::Quarantine { max_failures: 0 } = self.failure_policy {
            return Err(ConfigError::Invalid(
                "quarantine max_failures must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.download_root.join(LEDGER_FILE_NAME))
    }

    pub fn temp_torrent_path(&self) -> PathBuf {
        self.temp_torrent_path
            .clone()
            .unwrap_or_else(|| self.download_root.join(TEMP_TORRENT_FILE_NAME))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_secs.map(Duration::from_secs)
    }

    pub fn feed_interval(&self) -> Duration {
        Duration::from_secs(self.feed_interval_secs)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    /// Create the export directory if it does not exist yet
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if !self.export_dir.exists() {
            log::info!("Creating export directory {:?}", self.export_dir);
        }
        std::fs::create_dir_all(&self.export_dir)
    }
}
