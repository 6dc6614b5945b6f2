//! Integration tests for basic CLI behavior.
//!
//! Tests that the binary exists, accepts standard flags, and each subcommand
//! responds to `--help` with appropriate text.

#![allow(deprecated)] // cargo_bin deprecation, replacement not yet stable

use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: get a Command for the `streamcheck` binary.
fn streamcheck() -> Command {
    Command::cargo_bin("streamcheck").expect("binary 'streamcheck' should be built")
}

// ─── Top-level flags ─────────────────────────────────────────────────────────

#[test]
fn help_flag_shows_usage() {
    streamcheck()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: streamcheck"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("play"))
        .stdout(predicate::str::contains("open"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn version_flag_shows_semver() {
    streamcheck()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^streamcheck \d+\.\d+\.\d+\n$").unwrap());
}

#[test]
fn no_args_shows_error_and_usage() {
    streamcheck()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: streamcheck"));
}

#[test]
fn invalid_subcommand_fails() {
    streamcheck()
        .arg("this-is-not-a-real-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

// ─── Subcommand help ─────────────────────────────────────────────────────────

#[test]
fn check_help() {
    streamcheck()
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<PLAYLIST>"))
        .stdout(predicate::str::contains("--jobs"))
        .stdout(predicate::str::contains("--reachability-only"))
        .stdout(predicate::str::contains("--output-dir"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn play_help() {
    streamcheck()
        .args(["play", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--player"));
}

#[test]
fn check_requires_playlist() {
    streamcheck()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<PLAYLIST>"));
}

#[test]
fn zero_jobs_rejected_by_parser() {
    streamcheck()
        .args(["check", "list.m3u", "-j", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--jobs"));
}

// ─── Config ──────────────────────────────────────────────────────────────────

#[test]
fn config_prints_effective_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "concurrency = 7\nplayer = \"mpv\"\n").unwrap();

    streamcheck()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("concurrency = 7"))
        .stdout(predicate::str::contains("player = \"mpv\""))
        .stdout(predicate::str::contains("valid_file = \"validstreams.m3u\""));
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "concurrency = 0\n").unwrap();

    streamcheck()
        .arg("--config")
        .arg(&path)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn missing_config_file_fails() {
    streamcheck()
        .args(["--config", "/nonexistent/streamcheck.toml", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

// ─── Launchers ───────────────────────────────────────────────────────────────

#[test]
fn open_without_results_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!("output_dir = {:?}\n", dir.path().join("out").display().to_string()),
    )
    .unwrap();

    streamcheck()
        .arg("--config")
        .arg(&path)
        .arg("open")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn play_with_missing_player_fails() {
    streamcheck()
        .args(["play", "http://example.com/live.m3u8", "--player", "no-such-player-binary"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-such-player-binary"));
}
