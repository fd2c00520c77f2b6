//! Orchestrator - the poll loop
//!
//! One cycle: fetch the feed, pick unseen candidates carrying the quality
//! tag, and for each submit, wait, record and relocate, strictly one torrent
//! at a time. Failures are logged and the loop carries on.

use crate::config::{Config, FailurePolicy};
use crate::error::{Error, MonitorError, RelocateError, Result};
use crate::feed::FeedSource;
use crate::gateway::{Clock, TorrentGateway};
use crate::ledger::Ledger;
use crate::relocator::FileRelocator;
use crate::shutdown::Shutdown;
use crate::types::{CycleSummary, PipelineEvent, ReleaseCandidate, SkipReason};
use std::collections::HashMap;
use std::sync::Arc;

/// Result of handling a single candidate
enum Outcome {
    Skipped(SkipReason),
    Completed { files_moved: usize },
    Failed,
    Cancelled,
}

pub struct Orchestrator {
    config: Config,
    ledger: Ledger,
    feed: Arc<dyn FeedSource>,
    gateway: TorrentGateway,
    relocator: FileRelocator,
    clock: Arc<dyn Clock>,
    events: Option<async_channel::Sender<PipelineEvent>>,
    /// Consecutive failures per torrent URL, for the quarantine policy
    failures: HashMap<String, u32>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        ledger: Ledger,
        feed: Arc<dyn FeedSource>,
        gateway: TorrentGateway,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let relocator = FileRelocator::new(&config.video_extensions);
        Self {
            config,
            ledger,
            feed,
            gateway,
            relocator,
            clock,
            events: None,
            failures: HashMap::new(),
        }
    }

    /// Send pipeline events to `sender`. Use an unbounded channel or drain it;
    /// the loop waits on a full one.
    pub fn with_events(mut self, sender: async_channel::Sender<PipelineEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event).await;
        }
    }

    /// Run cycles until `shutdown` fires
    pub async fn run(&mut self, shutdown: Shutdown) {
        log::info!("Starting automatic torrent manager");

        while !shutdown.is_triggered() {
            let pause = match self.run_cycle(&shutdown).await {
                Ok(summary) => {
                    log::info!(
                        "Cycle done: {} submitted, {} completed, {} failed, {} skipped",
                        summary.submitted,
                        summary.completed,
                        summary.failed,
                        summary.skipped
                    );
                    self.config.feed_interval()
                }
                Err(Error::Fetch(e)) => {
                    log::error!("Error processing RSS feed: {}", e);
                    self.emit(PipelineEvent::FeedFailed(e.to_string())).await;
                    self.config.feed_interval()
                }
                Err(e) => {
                    log::error!("Error in main loop: {}", e);
                    self.config.recovery_interval()
                }
            };

            if shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                _ = self.clock.sleep(pause) => {}
                _ = shutdown.wait() => break,
            }
        }

        log::info!("Torrent manager stopped");
    }

    /// One pass over the feed
    pub async fn run_cycle(&mut self, shutdown: &Shutdown) -> Result<CycleSummary> {
        self.emit(PipelineEvent::CycleStarted).await;
        let candidates = self.feed.fetch(&self.config.feed_url).await?;

        let mut summary = CycleSummary {
            candidates: candidates.len(),
            ..CycleSummary::default()
        };

        for candidate in candidates {
            if shutdown.is_triggered() {
                break;
            }

            match self.process_candidate(&candidate, shutdown).await? {
                Outcome::Skipped(reason) => {
                    summary.skipped += 1;
                    self.emit(PipelineEvent::CandidateSkipped {
                        title: candidate.title.clone(),
                        reason,
                    })
                    .await;
                }
                Outcome::Completed { files_moved } => {
                    summary.submitted += 1;
                    summary.completed += 1;
                    summary.files_moved += files_moved;
                }
                Outcome::Failed => {
                    summary.failed += 1;
                }
                Outcome::Cancelled => {
                    summary.submitted += 1;
                    break;
                }
            }
        }

        self.emit(PipelineEvent::CycleFinished(summary)).await;
        Ok(summary)
    }

    /// Why `candidate` should not be submitted, if it should not
    fn skip_reason(&self, candidate: &ReleaseCandidate) -> Option<SkipReason> {
        let Some(url) = candidate.torrent_url.as_deref() else {
            return Some(SkipReason::MissingUrl);
        };
        if !candidate.title.contains(&self.config.quality_tag) {
            return Some(SkipReason::QualityMismatch);
        }
        if self.ledger.contains(url) {
            return Some(SkipReason::AlreadyDownloaded);
        }
        if let FailurePolicy::Quarantine { max_failures } = self.config.failure_policy {
            if self.failures.get(url).is_some_and(|n| *n >= max_failures) {
                return Some(SkipReason::Quarantined);
            }
        }
        None
    }

    async fn process_candidate(
        &mut self,
        candidate: &ReleaseCandidate,
        shutdown: &Shutdown,
    ) -> Result<Outcome> {
        let title = candidate.title.as_str();

        if let Some(reason) = self.skip_reason(candidate) {
            match reason {
                SkipReason::MissingUrl => log::warn!("No torrent URL found for {}", title),
                SkipReason::Quarantined => log::debug!("Skipping quarantined release {}", title),
                _ => {}
            }
            return Ok(Outcome::Skipped(reason));
        }
        let Some(url) = candidate.torrent_url.as_deref() else {
            return Ok(Outcome::Skipped(SkipReason::MissingUrl));
        };

        log::info!("New {} release found: {}", self.config.quality_tag, title);

        let handle = match self.gateway.submit(url).await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail(title, url, e.to_string()).await;
                return Ok(Outcome::Failed);
            }
        };
        self.emit(PipelineEvent::Submitted {
            title: title.to_string(),
            handle: handle.clone(),
        })
        .await;

        match self.gateway.await_completion(&handle, shutdown).await {
            Ok(_) => {}
            Err(MonitorError::Cancelled) => {
                log::info!("Stopped waiting for {} on shutdown", title);
                return Ok(Outcome::Cancelled);
            }
            Err(e) => {
                self.fail(title, url, e.to_string()).await;
                return Ok(Outcome::Failed);
            }
        }

        self.failures.remove(url);
        if let Err(e) = self.ledger.record(url, title) {
            log::error!("Error saving download history: {}", e);
        }
        self.emit(PipelineEvent::Completed {
            title: title.to_string(),
            url: url.to_string(),
        })
        .await;

        let files_moved = self.relocate().await?;
        Ok(Outcome::Completed { files_moved })
    }

    async fn fail(&mut self, title: &str, url: &str, error: String) {
        log::error!("Error processing torrent {}: {}", title, error);

        if let FailurePolicy::Quarantine { max_failures } = self.config.failure_policy {
            let count = self.failures.entry(url.to_string()).or_insert(0);
            *count += 1;
            if *count == max_failures {
                log::warn!("Quarantining {} after {} failures", title, max_failures);
            }
        }

        self.emit(PipelineEvent::Failed {
            title: title.to_string(),
            error,
        })
        .await;
    }

    /// Move finished files off the runtime threads. An export directory that
    /// cannot be created, or a panic in the walk, is a cycle-level failure;
    /// single files that fail to move are not.
    async fn relocate(&self) -> Result<usize> {
        let relocator = self.relocator.clone();
        let source = self.config.download_root.clone();
        let dest = self.config.export_dir.clone();

        let report = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dest).map_err(|e| RelocateError {
                path: dest.clone(),
                source: e,
            })?;
            Ok::<_, RelocateError>(relocator.relocate_all(&source, &dest))
        })
        .await??;

        for path in &report.moved {
            self.emit(PipelineEvent::FileMoved { path: path.clone() })
                .await;
        }
        if !report.failed.is_empty() {
            log::warn!("{} file(s) could not be moved", report.failed.len());
        }
        Ok(report.moved.len())
    }
}
