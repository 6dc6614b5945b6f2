//! ffmpeg content probe
//!
//! Pulls a few seconds of the stream into ffmpeg's null muxer. ffmpeg writes
//! machine-readable progress to stdout (`-progress pipe:1`), which tells us
//! whether media data was actually flowing when the time budget ran out.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{DeepProbeResult, MediaProbe};

/// stderr fragments that mean the input could not be opened or read.
const TRANSPORT_ERRORS: &[&str] = &[
    "Error opening input",
    "Connection timed out",
    "Connection refused",
    "Server returned",
    "could not find codec parameters",
    "Invalid data found when processing input",
];

/// ffmpeg-based [`MediaProbe`]
#[derive(Debug, Clone)]
pub struct FfmpegProbe {
    /// Path to ffmpeg binary
    ffmpeg_path: String,
    /// Sent as `-user_agent` for HTTP inputs
    user_agent: Option<String>,
}

impl Default for FfmpegProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegProbe {
    /// Create new probe, searching for ffmpeg in PATH
    pub fn new() -> Self {
        let ffmpeg_path = which::which("ffmpeg")
            .map_or_else(|_| "ffmpeg".to_string(), |p| p.to_string_lossy().to_string());

        Self {
            ffmpeg_path,
            user_agent: None,
        }
    }

    /// Specify custom ffmpeg binary path
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: &str) -> Self {
        self.ffmpeg_path = path.to_string();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    /// Build ffmpeg command arguments
    fn build_args(&self, url: &str, duration_cap: Duration) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostdin",
            "-nostats",
            "-loglevel",
            "error",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(std::string::ToString::to_string)
        .collect();

        // -user_agent is an http protocol option, other protocols reject it
        if let Some(ref ua) = self.user_agent {
            if url.starts_with("http://") || url.starts_with("https://") {
                args.push("-user_agent".to_string());
                args.push(ua.clone());
            }
        }

        args.push("-i".to_string());
        args.push(url.to_string());

        args.push("-t".to_string());
        args.push(duration_cap.as_secs().max(1).to_string());

        args.extend(["-f", "null", "-"].iter().map(std::string::ToString::to_string));

        args
    }

    /// Parse a `-progress` line, returning the byte count or output time if
    /// the line reports one.
    fn parse_progress(line: &str) -> Option<u64> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            "total_size" | "out_time_us" => value.parse().ok(),
            _ => None,
        }
    }

    /// Classify a finished ffmpeg run.
    fn classify_exit(success: bool, flowing: bool, stderr: &str) -> DeepProbeResult {
        if let Some(line) = stderr
            .lines()
            .find(|l| TRANSPORT_ERRORS.iter().any(|p| l.contains(p)))
        {
            return DeepProbeResult::Failure(line.trim().to_string());
        }

        if success {
            if flowing {
                DeepProbeResult::Success
            } else {
                DeepProbeResult::Failure("no media data received".to_string())
            }
        } else {
            let reason = stderr
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("ffmpeg exited with an error");
            DeepProbeResult::Failure(reason.to_string())
        }
    }
}

#[async_trait]
impl MediaProbe for FfmpegProbe {
    #[instrument(skip(self))]
    async fn deep_probe(
        &self,
        url: &str,
        duration_cap: Duration,
        timeout: Duration,
    ) -> DeepProbeResult {
        let args = self.build_args(url, duration_cap);
        debug!("ffmpeg args: {:?}", args);

        // kill_on_drop: a cancelled run drops this future mid-probe
        let mut child = match Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return DeepProbeResult::Failure(format!("failed to spawn ffmpeg: {e}")),
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return DeepProbeResult::Failure("failed to capture ffmpeg output".to_string());
        };

        let flowing = AtomicBool::new(false);

        let watch_progress = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if Self::parse_progress(&line).is_some_and(|v| v > 0) {
                    flowing.store(true, Ordering::Relaxed);
                }
            }
        };

        let collect_stderr = async {
            let mut buf = Vec::new();
            let _ = BufReader::new(stderr).read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        };

        let run = async {
            let ((), stderr, status) = tokio::join!(watch_progress, collect_stderr, child.wait());
            (stderr, status)
        };

        match tokio::time::timeout(timeout, run).await {
            Ok((stderr, Ok(status))) => {
                Self::classify_exit(status.success(), flowing.load(Ordering::Relaxed), &stderr)
            }
            Ok((_, Err(e))) => DeepProbeResult::Failure(format!("failed to wait for ffmpeg: {e}")),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("failed to kill ffmpeg after timeout: {}", e);
                }
                if flowing.load(Ordering::Relaxed) {
                    DeepProbeResult::TimedOutWhileFlowing
                } else {
                    DeepProbeResult::TimedOut
                }
            }
        }
    }

    /// Check if ffmpeg is available
    async fn check_available(&self) -> Result<(), String> {
        let status = Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| format!("{}: {e}", self.ffmpeg_path))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("{} -version exited with {status}", self.ffmpeg_path))
        }
    }
}
