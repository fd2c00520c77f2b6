//! Reelfetch cleanup - empties the `Downloads` staging folder

use clap::Parser;
use reelfetch_core::{confirm_and_clear, staging_dir, CleanupOutcome};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about = "Empty the Reelfetch Downloads folder after confirmation")]
struct Args {
    /// Folder to clear; defaults to `Downloads` next to the executable
    folder: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let dir = match args.folder {
        Some(dir) => dir,
        None => match staging_dir() {
            Ok(dir) => dir,
            Err(e) => {
                log::error!("Cannot locate executable directory: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    let stdin = std::io::stdin();
    match confirm_and_clear(&dir, stdin.lock(), std::io::stdout()) {
        Ok(CleanupOutcome::Cleared(removed)) => {
            log::info!("Removed {} entries from {:?}", removed, dir);
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Cleanup failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
