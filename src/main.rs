//! `streamcheck` CLI - probe playlist streams and sort them into valid/invalid

mod cmd;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use streamcheck::{Config, ProbeMethod};

#[derive(Parser)]
#[command(name = "streamcheck")]
#[command(about = "Check which streams in an M3U playlist are alive")]
#[command(version)]
struct Cli {
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every stream in a playlist
    Check {
        /// M3U playlist to check
        playlist: PathBuf,

        /// Streams to probe at once
        #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..=500))]
        jobs: Option<u16>,

        /// Skip the ffmpeg content probe
        #[arg(long)]
        reachability_only: bool,

        /// Directory for validstreams.m3u / invalidstreams.m3u
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// ffmpeg binary to use
        #[arg(long, value_name = "PATH")]
        ffmpeg: Option<PathBuf>,

        /// Reachability timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Hard cap on a single probe in seconds
        #[arg(long, value_name = "SECS")]
        deadline: Option<u64>,

        /// Send HEAD instead of GET for the reachability check
        #[arg(long)]
        head: bool,

        /// Custom User-Agent for probe requests
        #[arg(long, value_name = "UA")]
        user_agent: Option<String>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a stream or playlist (the valid streams by default)
    Play {
        /// URL or playlist file
        target: Option<String>,

        /// Player binary (vlc, mpv, ffplay, ...)
        #[arg(long)]
        player: Option<String>,
    },

    /// Open the valid streams playlist with the system handler
    Open,

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check {
            playlist,
            jobs,
            reachability_only,
            output_dir,
            ffmpeg,
            timeout,
            deadline,
            head,
            user_agent,
            json,
        } => {
            if let Some(jobs) = jobs {
                config.concurrency = usize::from(jobs);
            }
            if reachability_only {
                config.deep_probe = false;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if ffmpeg.is_some() {
                config.ffmpeg_path = ffmpeg;
            }
            if let Some(secs) = timeout {
                config.reachability_timeout_secs = secs;
            }
            if deadline.is_some() {
                config.probe_deadline_secs = deadline;
            }
            if head {
                config.method = ProbeMethod::Head;
            }
            if user_agent.is_some() {
                config.user_agent = user_agent;
            }
            config.validate()?;
            cmd::check::cmd_check(&config, &playlist, json).await?;
        }
        Commands::Play { target, player } => {
            if let Some(player) = player {
                config.player = player;
            }
            cmd::play::cmd_play(&config, target.as_deref())?;
        }
        Commands::Open => {
            cmd::open::cmd_open(&config)?;
        }
        Commands::Config => {
            cmd::config::cmd_config(&config, cli.config.as_deref())?;
        }
    }

    Ok(())
}

/// stderr logging; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from(path).with_context(|| format!("Failed to load {}", path.display()))
        }
        None => Config::load().context("Failed to load config"),
    }
}
