//! Staging folder cleanup
//!
//! Empties the `Downloads` folder next to the executable after an explicit
//! `y` from the user.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const STAGING_DIR_NAME: &str = "Downloads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The folder does not exist
    Missing,
    /// The user answered anything but `y`
    Aborted,
    /// Number of top-level entries removed
    Cleared(usize),
}

/// `Downloads` beside the running executable
pub fn staging_dir() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let base = exe.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(base.join(STAGING_DIR_NAME))
}

/// Ask for confirmation on `output`, read the answer from `input`, and empty
/// `dir` if it was `y`
pub fn confirm_and_clear<R: BufRead, W: Write>(
    dir: &Path,
    mut input: R,
    mut output: W,
) -> std::io::Result<CleanupOutcome> {
    if !dir.exists() {
        writeln!(
            output,
            "The Downloads folder does not exist: {}",
            dir.display()
        )?;
        return Ok(CleanupOutcome::Missing);
    }

    write!(
        output,
        "Are you sure you want to delete all contents in {}? (y/n): ",
        dir.display()
    )?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    if answer.trim().to_lowercase() != "y" {
        writeln!(output, "Deletion aborted by the user.")?;
        return Ok(CleanupOutcome::Aborted);
    }

    match clear_dir(dir) {
        Ok(removed) => {
            writeln!(output, "All contents in {} have been deleted.", dir.display())?;
            Ok(CleanupOutcome::Cleared(removed))
        }
        Err(e) => {
            writeln!(output, "An error occurred while deleting contents: {}", e)?;
            Err(e)
        }
    }
}

/// Remove every entry in `dir`, keeping `dir` itself
pub fn clear_dir(dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            std::fs::remove_dir_all(entry.path())?;
        } else {
            // Files and symlinks, including links to directories
            std::fs::remove_file(entry.path())?;
        }
        removed += 1;
        log::debug!("Removed {:?}", entry.path());
    }
    Ok(removed)
}
