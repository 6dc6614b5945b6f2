//! `streamcheck` - concurrent stream validation for M3U playlists
//!
//! # Features
//!
//! - **Two-stage probing**: HTTP reachability check, then a short ffmpeg decode
//! - **Bounded concurrency**: fixed number of probes in flight, pause/resume/cancel
//! - **Partitioned output**: valid and invalid entries appended to separate playlists
//! - **Client identity**: browser-like headers for origins that filter clients
//!
//! # Example
//!
//! ```rust,no_run
//! use streamcheck::{load_playlist, Config, RunEvent, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = SessionController::from_config(&Config::load()?)?;
//!     session.load(load_playlist("channels.m3u".as_ref())?)?;
//!
//!     let mut run = session.start().await?;
//!     while let Some(event) = run.events.recv().await {
//!         if let RunEvent::Finished(summary) = event {
//!             println!("{} valid of {}", summary.valid, summary.total);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod player;
pub mod playlist;
pub mod probe;
pub mod scheduler;
pub mod session;
pub mod sink;

pub use config::Config;
pub use descriptor::{clean_url, DescriptorStore, StreamDescriptor};
pub use error::{CheckError, Result};
pub use fingerprint::{chrome_identity, random_identity, ClientIdentity};
pub use player::{open_with_system, PlayerLauncher};
pub use playlist::{load_playlist, parse_playlist};
pub use probe::{
    DeepProbeResult, FfmpegProbe, HttpReachability, MediaProbe, ProbeError, ProbeMethod,
    ProbeOutcome, ProbeStrategy, ProbeTimeouts, ReachabilityClient, ReachabilityProbe,
    TwoStageProbe, Verdict,
};
pub use scheduler::{RunControl, RunObserver, RunSummary, Scheduler};
pub use session::{build_probe, RunEvent, RunHandle, SessionController, SessionSettings, SessionState};
pub use sink::{OutputPartition, ResultSink, RunState};

/// Version of streamcheck
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
