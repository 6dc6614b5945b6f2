//! Probe strategies: decide whether one stream is alive.
//!
//! A strategy combines up to two stages:
//!
//! 1. a [`ReachabilityClient`] that asks the origin for the URL and expects a
//!    success status within a few seconds, and
//! 2. a [`MediaProbe`] that pulls a short slice of the stream through a
//!    decoder.
//!
//! Strategies never fail. Transport errors, bad statuses and timeouts all end
//! up as a [`ProbeOutcome`] with a [`Verdict`], so one broken entry cannot take
//! down a run.

pub mod ffmpeg;
pub mod http;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::descriptor::StreamDescriptor;

pub use ffmpeg::FfmpegProbe;
pub use http::{HttpReachability, ProbeMethod};

/// Classification of a probed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Invalid,
    /// No answer within the probe's time budget. Counted as invalid.
    TimedOut,
}

impl Verdict {
    /// Whether the stream belongs in the valid partition.
    pub fn is_valid(self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Result of probing one descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub descriptor: StreamDescriptor,
    pub verdict: Verdict,
    pub detail: Option<String>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

pub(crate) fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

impl ProbeOutcome {
    #[must_use]
    pub fn new(descriptor: StreamDescriptor, verdict: Verdict, detail: Option<String>) -> Self {
        Self {
            descriptor,
            verdict,
            detail,
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }
}

/// Why a reachability check did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Transport(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("timed out")]
    Timeout,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

/// Result of a content probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepProbeResult {
    /// The decoder read the requested slice and exited cleanly.
    Success,
    /// Could not open or decode the stream.
    Failure(String),
    /// Time budget ran out while media data was still arriving.
    TimedOutWhileFlowing,
    /// Time budget ran out before any media data arrived.
    TimedOut,
}

/// Stage one: cheap request against the stream URL.
#[async_trait]
pub trait ReachabilityClient: Send + Sync {
    /// Returns the success status code, or why the URL is not reachable.
    async fn probe(&self, url: &str, timeout: Duration) -> Result<u16, ProbeError>;
}

/// Stage two: pull a slice of the stream through a decoder.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn deep_probe(&self, url: &str, duration_cap: Duration, timeout: Duration)
        -> DeepProbeResult;

    /// Verify the probe can run at all (binary present, etc.).
    async fn check_available(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Pluggable per-descriptor check used by the scheduler.
#[async_trait]
pub trait ProbeStrategy: Send + Sync {
    async fn probe(&self, descriptor: &StreamDescriptor) -> ProbeOutcome;

    /// One-time setup check before a run starts.
    async fn prepare(&self) -> crate::error::Result<()> {
        Ok(())
    }
}

/// Time budgets for the two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    pub reachability: Duration,
    pub deep_duration: Duration,
    pub deep_timeout: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            reachability: Duration::from_secs(5),
            deep_duration: Duration::from_secs(10),
            deep_timeout: Duration::from_secs(30),
        }
    }
}

fn verdict_for_error(err: &ProbeError) -> Verdict {
    match err {
        ProbeError::Timeout => Verdict::TimedOut,
        _ => Verdict::Invalid,
    }
}

/// Reachability only: valid iff the URL answers with a 2xx status.
///
/// This is the narrower guarantee. A server can answer 200 for a playlist
/// whose segments are dead.
pub struct ReachabilityProbe {
    client: Arc<dyn ReachabilityClient>,
    timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(client: Arc<dyn ReachabilityClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ProbeStrategy for ReachabilityProbe {
    #[instrument(skip(self, descriptor), fields(url = %descriptor.url()))]
    async fn probe(&self, descriptor: &StreamDescriptor) -> ProbeOutcome {
        let start = Instant::now();
        let (verdict, detail) = match self.client.probe(descriptor.url(), self.timeout).await {
            Ok(status) => (Verdict::Valid, format!("HTTP {status}")),
            Err(e) => (verdict_for_error(&e), e.to_string()),
        };
        ProbeOutcome::new(descriptor.clone(), verdict, Some(detail)).with_elapsed(start.elapsed())
    }
}

/// Reachability first, then a short decode.
///
/// A content probe that runs out of time while data is still flowing counts
/// as valid: the cap was reached, the stream did not fail.
pub struct TwoStageProbe {
    client: Arc<dyn ReachabilityClient>,
    media: Arc<dyn MediaProbe>,
    timeouts: ProbeTimeouts,
}

impl TwoStageProbe {
    pub fn new(
        client: Arc<dyn ReachabilityClient>,
        media: Arc<dyn MediaProbe>,
        timeouts: ProbeTimeouts,
    ) -> Self {
        Self {
            client,
            media,
            timeouts,
        }
    }
}

#[async_trait]
impl ProbeStrategy for TwoStageProbe {
    #[instrument(skip(self, descriptor), fields(url = %descriptor.url()))]
    async fn probe(&self, descriptor: &StreamDescriptor) -> ProbeOutcome {
        let start = Instant::now();
        let url = descriptor.url();

        match self.client.probe(url, self.timeouts.reachability).await {
            Ok(status) => debug!(status, "Reachable, starting content probe"),
            // rtmp://, rtsp://, udp:// ... only the decoder can tell
            Err(ProbeError::UnsupportedScheme(scheme)) => {
                debug!(%scheme, "Skipping reachability stage");
            }
            Err(e) => {
                return ProbeOutcome::new(descriptor.clone(), verdict_for_error(&e), Some(e.to_string()))
                    .with_elapsed(start.elapsed());
            }
        }

        let (verdict, detail) = match self
            .media
            .deep_probe(url, self.timeouts.deep_duration, self.timeouts.deep_timeout)
            .await
        {
            DeepProbeResult::Success => (Verdict::Valid, "decoded".to_string()),
            DeepProbeResult::TimedOutWhileFlowing => (
                Verdict::Valid,
                "probe cap reached while receiving data".to_string(),
            ),
            DeepProbeResult::TimedOut => (Verdict::TimedOut, "no media data received".to_string()),
            DeepProbeResult::Failure(reason) => (Verdict::Invalid, reason),
        };

        ProbeOutcome::new(descriptor.clone(), verdict, Some(detail)).with_elapsed(start.elapsed())
    }

    async fn prepare(&self) -> crate::error::Result<()> {
        self.media
            .check_available()
            .await
            .map_err(crate::error::CheckError::MediaProbeUnavailable)
    }
}
