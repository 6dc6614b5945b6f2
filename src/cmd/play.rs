use anyhow::{Context, Result};

use streamcheck::{Config, PlayerLauncher};

pub fn cmd_play(config: &Config, target: Option<&str>) -> Result<()> {
    let launcher = PlayerLauncher::new(config.player.as_str());

    if let Some(target) = target {
        println!("🎬 Playing {target} with {}", launcher.player());
        return launcher
            .play(target)
            .with_context(|| format!("Could not play {target}"));
    }

    let valid = config.valid_path();
    if valid.exists() {
        println!("🎬 Playing {} with {}", valid.display(), launcher.player());
        launcher
            .play(&valid.to_string_lossy())
            .context("Could not play valid streams")
    } else {
        println!("📭 No valid streams yet at {}, starting {} empty", valid.display(), launcher.player());
        launcher.launch_empty().context("Could not start player")
    }
}
