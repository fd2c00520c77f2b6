//! Reelfetch Core Library
//!
//! This crate provides the feed reader, Transmission RPC client, torrent
//! gateway, file relocator, download history ledger and the poll loop that
//! ties them together. The binaries only wire these up.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod ledger;
pub mod orchestrator;
pub mod relocator;
pub mod shutdown;
pub mod transmission;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use cleanup::{clear_dir, confirm_and_clear, staging_dir, CleanupOutcome};
pub use config::{Config, DaemonConfig, FailurePolicy};
pub use error::{
    ConfigError, Error, FetchError, MonitorError, PersistenceError, RelocateError, Result,
    RpcError, SubmissionError,
};
pub use feed::{parse_feed, FeedReader, FeedSource};
pub use gateway::{Clock, SystemClock, TorrentDaemon, TorrentGateway};
pub use ledger::Ledger;
pub use orchestrator::Orchestrator;
pub use relocator::{FileRelocator, RelocateReport};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use transmission::TransmissionClient;
pub use types::*;
