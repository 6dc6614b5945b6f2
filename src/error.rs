//! Error taxonomy for setup-time failures.
//!
//! Per-stream failures never show up here: the probe layer converts them into
//! [`ProbeOutcome`](crate::probe::ProbeOutcome)s. What remains are the errors
//! a caller has to act on (nothing to test, an unwritable output directory, a
//! missing ffmpeg binary, a player that would not start).

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the session, sink, loader and launcher.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("no streams to test")]
    EmptyInput,

    #[error("stream URL is empty after cleaning")]
    EmptyUrl,

    #[error("concurrency limit must be at least 1")]
    InvalidConcurrency,

    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("cannot prepare output file {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("media probe binary not usable: {0}")]
    MediaProbeUnavailable(String),

    #[error("failed to launch player: {0}")]
    Launch(String),

    #[error("failed to read playlist {}: {source}", path.display())]
    Playlist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, CheckError>;
