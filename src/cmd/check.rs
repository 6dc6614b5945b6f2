use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};

use streamcheck::{
    load_playlist, Config, ProbeOutcome, RunEvent, RunState, RunSummary, SessionController,
    SessionState, Verdict,
};

pub async fn cmd_check(config: &Config, playlist: &Path, json: bool) -> Result<()> {
    let descriptors = load_playlist(playlist)
        .with_context(|| format!("Failed to load playlist {}", playlist.display()))?;

    let session = SessionController::from_config(config).context("Failed to set up probes")?;
    session
        .load(descriptors)
        .with_context(|| format!("Nothing to check in {}", playlist.display()))?;

    let mut run = session.start().await.context("Failed to start run")?;

    if !json {
        eprintln!(
            "🔍 Checking {} streams ({} at a time{})",
            session.loaded(),
            config.concurrency,
            if config.deep_probe { ", with content probe" } else { "" }
        );
        eprintln!("   p + Enter = pause, r = resume, q = cancel, Ctrl-C = cancel\n");
    }

    spawn_stdin_controls(session.clone());
    let ctrl_c = {
        let session = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n🛑 Cancelling, waiting for running probes...");
                let _ = session.cancel();
            }
        })
    };

    while let Some(event) = run.events.recv().await {
        match event {
            RunEvent::Outcome { outcome, state } if !json => print_outcome(&outcome, &state),
            RunEvent::Progress(state) if !json => print_progress(&state),
            _ => {}
        }
    }
    ctrl_c.abort();

    let summary = run.join.await.context("Run task failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, config);
    }

    Ok(())
}

/// Line-based pause/resume/cancel on stdin.
///
/// Runs on a plain thread so a blocked read never holds up runtime shutdown.
fn spawn_stdin_controls(session: SessionController) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if session.state() == SessionState::Idle {
                break;
            }
            let result = match line.trim() {
                "p" | "pause" => session.pause(),
                "r" | "resume" => session.resume(),
                "q" | "quit" | "cancel" => session.cancel(),
                "" => continue,
                other => {
                    eprintln!("❓ Unknown command '{other}' (p = pause, r = resume, q = cancel)");
                    continue;
                }
            };
            if let Err(e) = result {
                eprintln!("⚠️  {e}");
            }
        }
    });
}

fn print_outcome(outcome: &ProbeOutcome, state: &RunState) {
    let icon = match outcome.verdict {
        Verdict::Valid => "✅",
        Verdict::Invalid => "❌",
        Verdict::TimedOut => "⏱️ ",
    };
    let detail = outcome
        .detail
        .as_deref()
        .map(|d| format!(" - {d}"))
        .unwrap_or_default();
    println!(
        "{icon} [{}/{}] {}{detail} ({}ms)",
        state.completed,
        state.total,
        outcome.descriptor.display_name(),
        outcome.elapsed.as_millis()
    );
}

fn print_progress(state: &RunState) {
    if state.cancelled {
        eprintln!("🛑 Cancelled, {} of {} checked", state.completed, state.total);
    } else if state.paused {
        eprintln!("⏸️  Paused (r + Enter to resume)");
    }
}

fn print_summary(summary: &RunSummary, config: &Config) {
    println!(
        "\n📊 {} of {} checked in {:.1}s: {} valid, {} invalid{}",
        summary.completed,
        summary.total,
        summary.elapsed.as_secs_f64(),
        summary.valid,
        summary.invalid,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    if summary.write_failures > 0 {
        println!("⚠️  {} results could not be written", summary.write_failures);
    }
    println!("💾 Valid:   {}", config.valid_path().display());
    println!("💾 Invalid: {}", config.invalid_path().display());
}
