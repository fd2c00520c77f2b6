//! Error handling for Reelfetch
//!
//! Each pipeline stage has its own error type so callers can decide what is
//! fatal. Inside the poll loop all of them are logged and skipped.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Feed could not be fetched or parsed
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("feed parse error: {0}")]
    Parse(String),
}

/// Transport or protocol failure talking to the torrent daemon
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("daemon request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("daemon rejected credentials")]
    Unauthorized,

    #[error("daemon returned HTTP {0}")]
    Status(u16),

    #[error("daemon did not provide a session id")]
    MissingSessionId,

    #[error("daemon reported: {0}")]
    Rpc(String),

    #[error("unexpected daemon response: {0}")]
    UnexpectedResponse(String),
}

/// A torrent could not be handed to the daemon
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("failed to download torrent file {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to stage torrent file at {path:?}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to add torrent: {0}")]
    Daemon(#[from] RpcError),
}

/// Waiting for a torrent to finish failed
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("status poll failed: {0}")]
    Daemon(#[from] RpcError),

    #[error("torrent {0} is no longer known to the daemon")]
    Missing(i64),

    #[error("torrent {name} did not finish within {waited:?}")]
    TimedOut { name: String, waited: Duration },

    #[error("wait cancelled by shutdown")]
    Cancelled,
}

/// A single file could not be moved to the export directory
#[derive(Debug, Error)]
#[error("failed to move {path:?}: {source}")]
pub struct RelocateError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// The download history could not be read or written
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration file problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Relocate(#[from] RelocateError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
