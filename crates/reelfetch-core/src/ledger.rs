//! Download history ledger
//!
//! A JSON object mapping each submitted torrent URL to its title and the time
//! it was recorded. Presence of a key means the URL has been handled before.
//! The whole document is rewritten on every insert, through a temp file that
//! is renamed over the original.

use crate::error::PersistenceError;
use crate::types::HistoryEntry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persistent URL -> history entry map
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, HistoryEntry>,
}

impl Ledger {
    /// Load the ledger at `path`.
    ///
    /// A missing file gives an empty ledger. So does an unreadable or corrupt
    /// one, after logging the problem.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Error loading download history from {:?}: {}", path, e);
                BTreeMap::new()
            }
        };

        log::info!("Loaded {} history entries from {:?}", entries.len(), path);
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&HistoryEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &HistoryEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Record `key` as downloaded and persist the whole ledger.
    ///
    /// The entry stays in memory even when the write fails.
    pub fn record(&mut self, key: &str, title: &str) -> Result<(), PersistenceError> {
        self.entries.insert(
            key.to_string(),
            HistoryEntry {
                title: title.to_string(),
                timestamp: chrono::Local::now().to_rfc3339(),
            },
        );
        self.save()
    }

    /// Write the ledger with a write-then-rename so a crash never leaves a
    /// truncated file behind
    pub fn save(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut data = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut data, formatter);
        self.entries.serialize(&mut serializer)?;

        let temp_path = temp_path_for(&self.path);
        std::fs::write(&temp_path, &data)?;
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, HistoryEntry>, PersistenceError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "ledger".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("history.json"));
        assert!(ledger.is_empty());
        assert!(!ledger.contains("https://example.com/a.torrent"));
    }

    #[test]
    fn test_record_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut ledger = Ledger::load(&path);
        ledger.record("https://example.com/a.torrent", "Movie A [1080p]").unwrap();
        ledger.record("magnet:?xt=urn:btih:abc", "Movie B [1080p]").unwrap();
        assert!(ledger.contains("https://example.com/a.torrent"));

        let reloaded = Ledger::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("https://example.com/a.torrent"));
        assert!(reloaded.contains("magnet:?xt=urn:btih:abc"));
        assert_eq!(
            reloaded.get("magnet:?xt=urn:btih:abc").unwrap().title,
            "Movie B [1080p]"
        );
    }

    #[test]
    fn test_timestamp_is_iso8601() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = Ledger::load(dir.path().join("history.json"));
        ledger.record("k", "t").unwrap();
        let timestamp = &ledger.get("k").unwrap().timestamp;
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_file_format_and_no_leftover_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut ledger = Ledger::load(&path);
        ledger.record("https://example.com/a.torrent", "A").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"https://example.com/a.torrent\": {"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["https://example.com/a.torrent"]["title"], "A");

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("history.json")]);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();

        let ledger = Ledger::load(&path);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_reads_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(
            &path,
            r#"{"https://yts.mx/torrent/download/X": {"title": "X (2020) [1080p]", "timestamp": "2024-01-02T03:04:05.000006"}}"#,
        )
        .unwrap();

        let ledger = Ledger::load(&path);
        assert!(ledger.contains("https://yts.mx/torrent/download/X"));
    }

    #[test]
    fn test_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");
        let mut ledger = Ledger::load(&path);
        ledger.record("k", "t").unwrap();
        assert!(path.exists());
    }
}
