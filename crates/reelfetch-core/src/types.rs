//! Types module - data structures shared by the pipeline stages

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A feed entry being evaluated for download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCandidate {
    pub title: String,
    /// First enclosure of the entry, if any
    pub torrent_url: Option<String>,
}

impl ReleaseCandidate {
    pub fn new(title: impl Into<String>, torrent_url: Option<String>) -> Self {
        Self {
            title: title.into(),
            torrent_url,
        }
    }
}

/// Metadata stored in the ledger for each submitted URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    /// ISO-8601 local time of the record
    pub timestamp: String,
}

/// A download tracked by the torrent daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentHandle {
    pub id: i64,
    pub name: String,
    /// Percent complete, 0 to 100
    pub progress: f64,
}

impl TorrentHandle {
    pub fn is_complete(&self) -> bool {
        self.progress >= 100.0
    }
}

/// Why a candidate was not submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    MissingUrl,
    QualityMismatch,
    AlreadyDownloaded,
    Quarantined,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingUrl => write!(f, "no torrent url"),
            SkipReason::QualityMismatch => write!(f, "quality tag missing"),
            SkipReason::AlreadyDownloaded => write!(f, "already downloaded"),
            SkipReason::Quarantined => write!(f, "quarantined after repeated failures"),
        }
    }
}

/// Counters for one pass over the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub candidates: usize,
    pub skipped: usize,
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub files_moved: usize,
}

/// Progress notifications emitted by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    CycleStarted,
    CandidateSkipped { title: String, reason: SkipReason },
    Submitted { title: String, handle: TorrentHandle },
    Completed { title: String, url: String },
    Failed { title: String, error: String },
    FileMoved { path: PathBuf },
    CycleFinished(CycleSummary),
    FeedFailed(String),
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::CycleStarted => write!(f, "cycle started"),
            PipelineEvent::CandidateSkipped { title, reason } => {
                write!(f, "skipped {}: {}", title, reason)
            }
            PipelineEvent::Submitted { title, handle } => {
                write!(f, "submitted {} as torrent {}", title, handle.id)
            }
            PipelineEvent::Completed { title, .. } => write!(f, "completed {}", title),
            PipelineEvent::Failed { title, error } => write!(f, "failed {}: {}", title, error),
            PipelineEvent::FileMoved { path } => write!(f, "moved {}", path.display()),
            PipelineEvent::CycleFinished(summary) => write!(
                f,
                "cycle finished: {} candidates, {} skipped, {} submitted, {} completed, {} failed, {} files moved",
                summary.candidates,
                summary.skipped,
                summary.submitted,
                summary.completed,
                summary.failed,
                summary.files_moved
            ),
            PipelineEvent::FeedFailed(error) => write!(f, "feed failed: {}", error),
        }
    }
}
