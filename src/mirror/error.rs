//! Error types for the mirror engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from mirror operations.
///
/// Every variant is either a startup failure or a structural failure: the
/// watch or destination state can no longer be trusted. Individual copy and
/// delete failures are not errors, they end up in a `BatchReport`.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch directory {path}: {reason}")]
    WatchFailed { path: PathBuf, reason: String },

    #[error("Cannot walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },

    #[error("Cannot read metadata of {path}: {reason}")]
    Stat { path: PathBuf, reason: String },

    #[error("Path {path} is not under {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Invalid destination {path}: {reason}")]
    InvalidDestination { path: PathBuf, reason: String },

    #[error("Initial copy failed at {path}: {reason}")]
    Bootstrap { path: PathBuf, reason: String },

    #[error("Event source closed with {pending} pending change(s)")]
    SourceClosed { pending: usize },
}

impl From<notify::Error> for MirrorError {
    fn from(e: notify::Error) -> Self {
        MirrorError::InitFailed {
            reason: e.to_string(),
        }
    }
}
