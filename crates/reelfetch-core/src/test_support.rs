//! Test doubles for the pipeline seams.
//!
//! `MockDaemon`, `MockFeed` and `FakeClock` stand in for the torrent daemon,
//! the feed and wall-clock time.

use crate::error::{FetchError, RpcError};
use crate::feed::FeedSource;
use crate::gateway::{Clock, TorrentDaemon};
use crate::shutdown::ShutdownTrigger;
use crate::types::{ReleaseCandidate, TorrentHandle};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ============================================================================
// Mock daemon
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DaemonCall {
    AddMagnet(String),
    /// Path of the staged file and whether it existed at submission time
    AddFile(PathBuf, bool),
    Status(i64),
    Remove(i64, bool),
}

#[derive(Default)]
struct DaemonState {
    next_id: i64,
    calls: Vec<DaemonCall>,
    /// Progress values returned by successive polls, per torrent
    progress: HashMap<i64, VecDeque<f64>>,
    /// Progress script applied to each newly added torrent
    script: Vec<f64>,
    fail_add_for: Vec<String>,
    fail_status: bool,
}

/// In-memory torrent daemon recording every call
#[derive(Clone, Default)]
pub struct MockDaemon {
    state: Arc<Mutex<DaemonState>>,
}

impl MockDaemon {
    /// Torrents complete on the first poll
    pub fn new() -> Self {
        Self::with_progress(vec![100.0])
    }

    /// Every torrent reports these progress values in turn; the last one repeats
    pub fn with_progress(script: Vec<f64>) -> Self {
        let daemon = Self::default();
        daemon.state.lock().unwrap().script = script;
        daemon
    }

    /// Make `add_*` fail for sources containing `needle`
    pub fn fail_add_for(&self, needle: &str) {
        self.state.lock().unwrap().fail_add_for.push(needle.to_string());
    }

    pub fn fail_status(&self) {
        self.state.lock().unwrap().fail_status = true;
    }

    pub fn calls(&self) -> Vec<DaemonCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn added(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DaemonCall::AddMagnet(_) | DaemonCall::AddFile(..)))
            .count()
    }

    fn add(&self, source: &str, name: &str) -> Result<TorrentHandle, RpcError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_add_for.iter().any(|n| source.contains(n.as_str())) {
            return Err(RpcError::Rpc("invalid or corrupt torrent file".to_string()));
        }
        state.next_id += 1;
        let id = state.next_id;
        let script: VecDeque<f64> = state.script.iter().copied().collect();
        state.progress.insert(id, script);
        Ok(TorrentHandle {
            id,
            name: name.to_string(),
            progress: 0.0,
        })
    }
}

#[async_trait]
impl TorrentDaemon for MockDaemon {
    async fn add_magnet(&self, uri: &str, _download_dir: &Path) -> Result<TorrentHandle, RpcError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(DaemonCall::AddMagnet(uri.to_string()));
        self.add(uri, uri)
    }

    async fn add_file(&self, path: &Path, _download_dir: &Path) -> Result<TorrentHandle, RpcError> {
        let contents = std::fs::read_to_string(path).unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .calls
            .push(DaemonCall::AddFile(path.to_path_buf(), path.exists()));
        self.add(&contents, "from file")
    }

    async fn status(&self, id: i64) -> Result<Option<TorrentHandle>, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DaemonCall::Status(id));
        if state.fail_status {
            return Err(RpcError::Status(500));
        }
        let Some(queue) = state.progress.get_mut(&id) else {
            return Ok(None);
        };
        let progress = if queue.len() > 1 {
            queue.pop_front().unwrap_or(100.0)
        } else {
            queue.front().copied().unwrap_or(100.0)
        };
        Ok(Some(TorrentHandle {
            id,
            name: format!("torrent-{}", id),
            progress,
        }))
    }

    async fn remove(&self, id: i64, delete_data: bool) -> Result<(), RpcError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(DaemonCall::Remove(id, delete_data));
        state.progress.remove(&id);
        Ok(())
    }
}

// ============================================================================
// Mock feed
// ============================================================================

/// Feed returning queued results, then the last configured entries forever
#[derive(Clone, Default)]
pub struct MockFeed {
    results: Arc<Mutex<VecDeque<Result<Vec<ReleaseCandidate>, String>>>>,
    fetches: Arc<Mutex<usize>>,
}

impl MockFeed {
    pub fn with_entries(entries: Vec<ReleaseCandidate>) -> Self {
        let feed = Self::default();
        feed.push_entries(entries);
        feed
    }

    pub fn push_entries(&self, entries: Vec<ReleaseCandidate>) {
        self.results.lock().unwrap().push_back(Ok(entries));
    }

    pub fn push_error(&self, message: &str) {
        self.results
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl FeedSource for MockFeed {
    async fn fetch(&self, _feed_url: &str) -> Result<Vec<ReleaseCandidate>, FetchError> {
        *self.fetches.lock().unwrap() += 1;
        let mut results = self.results.lock().unwrap();
        let next = if results.len() > 1 {
            results.pop_front()
        } else {
            results.front().cloned()
        };
        match next {
            Some(Ok(entries)) => Ok(entries),
            Some(Err(message)) => Err(FetchError::Parse(message)),
            None => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// Fake clock
// ============================================================================

/// Clock whose sleeps return at once and advance virtual time
#[derive(Clone)]
pub struct FakeClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    stop_after: Arc<Mutex<Option<(usize, Arc<ShutdownTrigger>)>>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            stop_after: Arc::new(Mutex::new(None)),
        }
    }

    /// Fire `trigger` once `count` sleeps have happened
    pub fn shutdown_after(&self, count: usize, trigger: ShutdownTrigger) {
        *self.stop_after.lock().unwrap() = Some((count, Arc::new(trigger)));
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        let count = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len()
        };
        let trigger = self
            .stop_after
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(after, _)| count >= *after)
            .map(|(_, trigger)| trigger.clone());
        if let Some(trigger) = trigger {
            trigger.trigger();
        }
        tokio::task::yield_now().await;
    }
}
