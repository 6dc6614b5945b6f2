//! Configuration loaded from `~/.config/streamcheck/config.toml`.
//!
//! Every field is optional in the file; missing ones take the defaults below.
//! The CLI applies its flags on top of the loaded value.
//!
//! ```toml
//! concurrency = 20
//! deep_probe = true
//! output_dir = "/home/me/playlists"
//! player = "mpv"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CheckError, Result};
use crate::probe::{ProbeMethod, ProbeTimeouts};

/// Effective settings for sessions and the player launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Probes running at once.
    pub concurrency: usize,
    pub reachability_timeout_secs: u64,
    /// Run the ffmpeg content probe after the reachability check.
    pub deep_probe: bool,
    /// Seconds of media the content probe reads.
    pub deep_probe_duration_secs: u64,
    pub deep_probe_timeout_secs: u64,
    /// Hard cap per probe across both stages.
    pub probe_deadline_secs: Option<u64>,
    pub method: ProbeMethod,
    pub output_dir: PathBuf,
    pub valid_file: String,
    pub invalid_file: String,
    pub player: String,
    pub ffmpeg_path: Option<PathBuf>,
    pub user_agent: Option<String>,
    /// Pick a random built-in identity per run instead of the default one.
    pub rotate_user_agent: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 10,
            reachability_timeout_secs: 5,
            deep_probe: true,
            deep_probe_duration_secs: 10,
            deep_probe_timeout_secs: 30,
            probe_deadline_secs: None,
            method: ProbeMethod::Get,
            output_dir: default_output_dir(),
            valid_file: "validstreams.m3u".to_string(),
            invalid_file: "invalidstreams.m3u".to_string(),
            player: "vlc".to_string(),
            ffmpeg_path: None,
            user_agent: None,
            rotate_user_agent: false,
        }
    }
}

impl Config {
    /// Load from the default location.
    ///
    /// Returns defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load from `path`, falling back to defaults when it is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CheckError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CheckError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| CheckError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CheckError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CheckError::InvalidConcurrency);
        }
        if self.reachability_timeout_secs == 0 || self.deep_probe_timeout_secs == 0 {
            return Err(CheckError::Config("timeouts must be at least 1 second".into()));
        }
        if self.probe_deadline_secs == Some(0) {
            return Err(CheckError::Config("probe_deadline_secs must be at least 1".into()));
        }
        if self.valid_file.is_empty() || self.invalid_file.is_empty() || self.valid_file == self.invalid_file {
            return Err(CheckError::Config(
                "valid_file and invalid_file must be distinct, non-empty names".into(),
            ));
        }
        Ok(())
    }

    pub fn timeouts(&self) -> ProbeTimeouts {
        ProbeTimeouts {
            reachability: Duration::from_secs(self.reachability_timeout_secs),
            deep_duration: Duration::from_secs(self.deep_probe_duration_secs),
            deep_timeout: Duration::from_secs(self.deep_probe_timeout_secs),
        }
    }

    pub fn probe_deadline(&self) -> Option<Duration> {
        self.probe_deadline_secs.map(Duration::from_secs)
    }

    pub fn valid_path(&self) -> PathBuf {
        self.output_dir.join(&self.valid_file)
    }

    pub fn invalid_path(&self) -> PathBuf {
        self.output_dir.join(&self.invalid_file)
    }
}

/// Return the path to the config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streamcheck")
        .join("config.toml")
}

/// Desktop if the platform has one, like the tool always did; else cwd.
fn default_output_dir() -> PathBuf {
    dirs::desktop_dir()
        .filter(|d| d.is_dir())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.timeouts(), ProbeTimeouts::default());
    }

    #[test]
    fn parse_partial_config() {
        let config = Config::from_toml_str(
            r#"
concurrency = 25
deep_probe = false
method = "HEAD"
output_dir = "/tmp/out"
probe_deadline_secs = 45
"#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 25);
        assert!(!config.deep_probe);
        assert_eq!(config.method, ProbeMethod::Head);
        assert_eq!(config.valid_path(), PathBuf::from("/tmp/out/validstreams.m3u"));
        assert_eq!(config.invalid_path(), PathBuf::from("/tmp/out/invalidstreams.m3u"));
        assert_eq!(config.probe_deadline(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Config::from_toml_str("concurrency = 0"),
            Err(CheckError::InvalidConcurrency)
        ));
        assert!(Config::from_toml_str("reachability_timeout_secs = 0").is_err());
        assert!(Config::from_toml_str("valid_file = \"same.m3u\"\ninvalid_file = \"same.m3u\"").is_err());
        assert!(Config::from_toml_str("concurency = 3").is_err());
        assert!(Config::from_toml_str("concurrency = \"many\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            concurrency: 3,
            user_agent: Some("Custom/1.0".into()),
            ..Config::default()
        };
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn config_path_ends_with_crate_dir() {
        assert!(config_path().ends_with("streamcheck/config.toml"));
    }
}
