//! Integration tests for `streamcheck check`.
//!
//! Runs the binary against playlists pointing at a local wiremock server, so
//! no network access is needed.

#![allow(deprecated)] // cargo_bin deprecation, replacement not yet stable

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn streamcheck() -> Command {
    Command::cargo_bin("streamcheck").expect("binary 'streamcheck' should be built")
}

/// Empty config file so the user's own config never leaks into a test.
fn empty_config(dir: &Path) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, "").unwrap();
    path
}

// ─── Setup errors ────────────────────────────────────────────────────────────

#[test]
fn missing_playlist_fails() {
    let dir = tempfile::tempdir().unwrap();
    streamcheck()
        .arg("--config")
        .arg(empty_config(dir.path()))
        .args(["check", "/nonexistent/playlist.m3u"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load playlist"));
}

#[test]
fn empty_playlist_fails() {
    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("empty.m3u");
    std::fs::write(&playlist, "#EXTM3U\n# nothing here\n").unwrap();

    streamcheck()
        .arg("--config")
        .arg(empty_config(dir.path()))
        .arg("check")
        .arg(&playlist)
        .arg("--reachability-only")
        .arg("-o")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no streams to test"));
}

#[test]
fn missing_ffmpeg_fails_before_probing() {
    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("list.m3u");
    std::fs::write(&playlist, "http://127.0.0.1:1/live.m3u8\n").unwrap();

    streamcheck()
        .arg("--config")
        .arg(empty_config(dir.path()))
        .arg("check")
        .arg(&playlist)
        .args(["--ffmpeg", "/nonexistent/ffmpeg", "-o"])
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("media probe binary not usable"));
}

// ─── Runs ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn check_sorts_streams_and_prints_summary() {
    let server = MockServer::start().await;
    Mock::given(path("/ok.m3u8"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(path("/missing.m3u8"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("list.m3u");
    std::fs::write(
        &playlist,
        format!(
            "#EXTM3U\n#EXTINF:-1,Working\n{0}/ok.m3u8\n#EXTINF:-1,Broken\n{0}/missing.m3u8\n",
            server.uri()
        ),
    )
    .unwrap();
    let out = dir.path().join("out");
    let config = empty_config(dir.path());

    let assert = {
        let out = out.clone();
        tokio::task::spawn_blocking(move || {
            streamcheck()
                .arg("--config")
                .arg(&config)
                .arg("check")
                .arg(&playlist)
                .args(["--reachability-only", "-j", "2", "-o"])
                .arg(&out)
                .assert()
        })
        .await
        .unwrap()
    };

    assert
        .success()
        .stdout(predicate::str::contains("Working"))
        .stdout(predicate::str::contains("HTTP 404"))
        .stdout(predicate::str::contains("1 valid, 1 invalid"));

    let valid = std::fs::read_to_string(out.join("validstreams.m3u")).unwrap();
    assert!(valid.starts_with("#EXTINF:-1,Working\n"));
    let invalid = std::fs::read_to_string(out.join("invalidstreams.m3u")).unwrap();
    assert!(invalid.starts_with("#EXTINF:-1,Broken\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn json_summary_is_machine_readable() {
    let server = MockServer::start().await;
    Mock::given(path("/ok.m3u8"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("list.m3u");
    std::fs::write(&playlist, format!("{}/ok.m3u8\n", server.uri())).unwrap();
    let out = dir.path().join("out");
    let config = empty_config(dir.path());

    let output = tokio::task::spawn_blocking(move || {
        streamcheck()
            .arg("--config")
            .arg(&config)
            .arg("check")
            .arg(&playlist)
            .args(["--reachability-only", "--json", "-o"])
            .arg(&out)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["valid"], 1);
    assert_eq!(summary["invalid"], 0);
    assert_eq!(summary["cancelled"], false);
    assert!(summary["run_id"].is_string());
    assert!(summary["elapsed_ms"].is_number());
}
