//! File relocator
//!
//! Moves finished video files out of the daemon's download tree into the
//! export directory. Names are kept; an existing file of the same name in the
//! export directory is overwritten. Symlinked files count as files and the
//! link itself is moved; symlinked directories are not descended into.

use crate::error::RelocateError;
use std::path::{Path, PathBuf};

/// Outcome of one relocation pass
#[derive(Debug, Default)]
pub struct RelocateReport {
    /// Destination paths of moved files
    pub moved: Vec<PathBuf>,
    pub failed: Vec<RelocateError>,
}

/// Finds and moves video files by extension
#[derive(Debug, Clone)]
pub struct FileRelocator {
    extensions: Vec<String>,
}

impl FileRelocator {
    /// `extensions` are compared case-insensitively, with or without a leading dot
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .is_some_and(|e| self.extensions.iter().any(|x| *x == e))
    }

    /// All matching files below `root`. Unreadable directories are logged and
    /// skipped; anything under `exclude` is ignored.
    pub fn find_videos(&self, root: &Path, exclude: Option<&Path>) -> Vec<PathBuf> {
        let mut found = Vec::new();
        self.walk(root, exclude, &mut found);
        found.sort();
        found
    }

    fn walk(&self, dir: &Path, exclude: Option<&Path>, found: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot read directory {:?}: {}", dir, e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(mut file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                match std::fs::metadata(&path) {
                    Ok(target) if target.is_file() => file_type = target.file_type(),
                    _ => continue,
                }
            }

            if file_type.is_dir() {
                if exclude.is_some_and(|ex| same_path(&path, ex)) {
                    continue;
                }
                self.walk(&path, exclude, found);
            } else if file_type.is_file() && self.matches(&path) {
                found.push(path);
            }
        }
    }

    /// Move every matching file under `source_root` into `dest_dir`.
    ///
    /// A failed move is logged and recorded; the rest still run.
    pub fn relocate_all(&self, source_root: &Path, dest_dir: &Path) -> RelocateReport {
        let mut report = RelocateReport::default();

        if let Err(source) = std::fs::create_dir_all(dest_dir) {
            log::error!("Cannot create export directory {:?}: {}", dest_dir, source);
            report.failed.push(RelocateError {
                path: dest_dir.to_path_buf(),
                source,
            });
            return report;
        }

        for file in self.find_videos(source_root, Some(dest_dir)) {
            match move_file(&file, dest_dir) {
                Ok(target) => {
                    log::info!("Moved {:?} to export directory", target.file_name().unwrap_or_default());
                    report.moved.push(target);
                }
                Err(source) => {
                    log::error!("Error moving file {:?}: {}", file, source);
                    report.failed.push(RelocateError { path: file, source });
                }
            }
        }

        report
    }
}

/// Rename into `dest_dir`, falling back to copy and delete across filesystems
fn move_file(file: &Path, dest_dir: &Path) -> std::io::Result<PathBuf> {
    let name = file.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let target = dest_dir.join(name);

    if std::fs::rename(file, &target).is_err() {
        std::fs::copy(file, &target)?;
        std::fs::remove_file(file)?;
    }
    Ok(target)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
