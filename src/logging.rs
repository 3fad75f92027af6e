//! Tracing setup

use std::env;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

const FILTER_ENV: &str = "SOUNDMETER_LOG";

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Standard error, for commands that print plain text
    Stderr,
    /// A file in the temp directory, so the terminal UI stays intact
    File,
}

/// Path of the log file used while the terminal UI owns the screen
pub fn log_file_path() -> PathBuf {
    env::var("SOUNDMETER_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("soundmeter.log"))
}

/// Open the log file for appending, telling the user on stderr when it
/// cannot be opened (the terminal UI is not up yet at this point)
fn open_log_file(path: &Path) -> Option<File> {
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!("Logging disabled: cannot open {}: {}", path.display(), err);
            None
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber once
pub fn init_tracing(target: LogTarget) {
    let _ = TRACING_INIT.get_or_init(|| match target {
        LogTarget::Stderr => {
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .with_target(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        LogTarget::File => {
            let Some(file) = open_log_file(&log_file_path()) else {
                return;
            };
            let subscriber = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    });
}
