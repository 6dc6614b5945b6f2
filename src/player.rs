//! Hand streams or partition files to an external player.
//!
//! Players are started detached: the call returns as soon as the process has
//! been spawned. A background thread waits on the child so long-running
//! callers don't accumulate zombies.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::error::{CheckError, Result};

/// Starts a media player (`vlc` unless configured otherwise).
#[derive(Debug, Clone)]
pub struct PlayerLauncher {
    player: String,
}

impl Default for PlayerLauncher {
    fn default() -> Self {
        Self::new("vlc")
    }
}

impl PlayerLauncher {
    pub fn new(player: impl Into<String>) -> Self {
        Self {
            player: player.into(),
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    /// Play a URL or playlist file.
    pub fn play(&self, target: &str) -> Result<()> {
        let binary = self.resolve()?;
        info!(player = %binary.display(), %target, "Launching player");
        spawn_detached(&binary, player_args(&self.player), Some(target)).map(drop)
    }

    /// Open the player without anything queued.
    pub fn launch_empty(&self) -> Result<()> {
        let binary = self.resolve()?;
        info!(player = %binary.display(), "Launching player");
        spawn_detached(&binary, &[], None).map(drop)
    }

    fn resolve(&self) -> Result<PathBuf> {
        which::which(&self.player)
            .map_err(|e| CheckError::Launch(format!("{} not found: {e}", self.player)))
    }
}

/// Extra flags so the player exits or shows a window on its own.
fn player_args(player: &str) -> &'static [&'static str] {
    let name = Path::new(player)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(player);
    match name {
        "vlc" => &["--play-and-exit"],
        "mpv" => &["--force-window=immediate"],
        "ffplay" => &["-autoexit"],
        _ => &[],
    }
}

/// Open `path` with whatever the desktop associates with it.
pub fn open_with_system(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(CheckError::Launch(format!(
            "{} does not exist",
            path.display()
        )));
    }

    let target = path.to_string_lossy();
    let (opener, args): (&str, &[&str]) = if cfg!(target_os = "macos") {
        ("open", &[])
    } else if cfg!(windows) {
        ("cmd", &["/C", "start", ""])
    } else {
        ("xdg-open", &[])
    };

    let binary = which::which(opener)
        .map_err(|e| CheckError::Launch(format!("{opener} not found: {e}")))?;
    info!(opener, path = %path.display(), "Opening with system handler");
    spawn_detached(&binary, args, Some(target.as_ref())).map(drop)
}

/// Spawn and hand the child to a reaper thread, which yields its exit status.
fn spawn_detached(
    binary: &Path,
    args: &[&str],
    target: Option<&str>,
) -> Result<JoinHandle<Option<ExitStatus>>> {
    let mut command = Command::new(binary);
    command
        .args(args)
        .args(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let mut child = command
        .spawn()
        .map_err(|e| CheckError::Launch(format!("failed to spawn {}: {e}", binary.display())))?;
    let pid = child.id();
    debug!(pid, "Player spawned");

    Ok(std::thread::spawn(move || match child.wait() {
        Ok(status) => {
            debug!(pid, %status, "Player exited");
            Some(status)
        }
        Err(e) => {
            warn!(pid, error = %e, "Failed to wait for player");
            None
        }
    }))
}
