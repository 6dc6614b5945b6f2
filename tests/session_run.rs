//! End-to-end runs through `SessionController` against a local HTTP server.
//!
//! Reachability goes to a wiremock server; the content probe, where used, is
//! a shell script standing in for ffmpeg.

use std::path::Path;
use std::time::Duration;

use streamcheck::{parse_playlist, Config, RunEvent, RunHandle, RunSummary, SessionController, Verdict};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/live/good.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/live/gone.m3u8"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn playlist(server: &MockServer) -> String {
    format!(
        "#EXTM3U\n\
         #EXTINF:-1 tvg-id=\"good\",Good Channel\n\
         {0}/live/good.m3u8\n\
         #EXTINF:-1,Gone Channel\n\
         {0}/live/gone.m3u8\n\
         #EXTINF:-1,Closed Port\n\
         http://127.0.0.1:1/live.m3u8\n",
        server.uri()
    )
}

fn config(out: &Path) -> Config {
    Config {
        deep_probe: false,
        reachability_timeout_secs: 2,
        output_dir: out.to_path_buf(),
        ..Config::default()
    }
}

async fn finish(mut run: RunHandle) -> (RunSummary, Vec<(String, Verdict)>) {
    let mut verdicts = Vec::new();
    let mut finished = None;
    while let Some(event) = run.events.recv().await {
        match event {
            RunEvent::Outcome { outcome, .. } => {
                verdicts.push((outcome.descriptor.display_name().to_string(), outcome.verdict));
            }
            RunEvent::Finished(summary) => finished = Some(summary),
            RunEvent::Progress(_) => {}
        }
    }
    let summary = run.join.await.unwrap();
    assert_eq!(finished.as_ref(), Some(&summary));
    verdicts.sort_by(|a, b| a.0.cmp(&b.0));
    (summary, verdicts)
}

fn read(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap()
}

// ─── Reachability only ──────────────────────────────────────────────────────

#[tokio::test]
async fn reachability_run_partitions_every_entry() {
    let server = server().await;
    let out = tempfile::tempdir().unwrap();
    let session = SessionController::from_config(&config(out.path())).unwrap();

    session.load(parse_playlist(&playlist(&server))).unwrap();
    let (summary, verdicts) = finish(session.start().await.unwrap()).await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.valid + summary.invalid, summary.total);
    assert_eq!(summary.valid, 1);
    assert_eq!(
        verdicts,
        vec![
            ("Closed Port".to_string(), Verdict::Invalid),
            ("Gone Channel".to_string(), Verdict::Invalid),
            ("Good Channel".to_string(), Verdict::Valid),
        ]
    );

    let valid = read(out.path(), "validstreams.m3u");
    assert_eq!(
        valid,
        format!(
            "#EXTINF:-1 tvg-id=\"good\",Good Channel\n{}/live/good.m3u8\n",
            server.uri()
        )
    );
    let invalid = read(out.path(), "invalidstreams.m3u");
    assert!(invalid.contains("#EXTINF:-1,Gone Channel\n"));
    assert!(invalid.contains("http://127.0.0.1:1/live.m3u8\n"));
    assert_eq!(invalid.lines().count(), 4);
}

#[tokio::test]
async fn second_run_replaces_previous_results() {
    let server = server().await;
    let out = tempfile::tempdir().unwrap();
    let session = SessionController::from_config(&config(out.path())).unwrap();

    session.load(parse_playlist(&playlist(&server))).unwrap();
    finish(session.start().await.unwrap()).await;

    let only_good = format!("{}/live/good.m3u8\n", server.uri());
    session.load(parse_playlist(&only_good)).unwrap();
    let (summary, _) = finish(session.start().await.unwrap()).await;

    assert_eq!((summary.valid, summary.invalid), (1, 0));
    assert_eq!(read(out.path(), "validstreams.m3u").lines().count(), 2);
    assert_eq!(read(out.path(), "invalidstreams.m3u"), "");
}

// ─── Two-stage with a stand-in decoder ──────────────────────────────────────

#[cfg(unix)]
fn fake_ffmpeg(dir: &Path, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("ffmpeg");
    let text = format!(
        "#!/bin/sh\nif [ \"$1\" = \"-version\" ]; then echo 'ffmpeg version test'; exit 0; fi\n{body}\n"
    );
    std::fs::write(&script, text).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[cfg(unix)]
#[tokio::test]
async fn two_stage_run_uses_decoder_verdict() {
    let server = server().await;
    let out = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let config = Config {
        deep_probe: true,
        deep_probe_timeout_secs: 5,
        ffmpeg_path: Some(fake_ffmpeg(
            bin.path(),
            "echo total_size=4096\necho progress=end\nexit 0",
        )),
        ..config(out.path())
    };
    let session = SessionController::from_config(&config).unwrap();

    session.load(parse_playlist(&playlist(&server))).unwrap();
    let (summary, verdicts) = finish(session.start().await.unwrap()).await;

    // the decoder only sees what passed reachability
    assert_eq!(summary.valid, 1);
    assert_eq!(verdicts[2], ("Good Channel".to_string(), Verdict::Valid));
}

#[cfg(unix)]
#[tokio::test]
async fn decoder_flowing_at_timeout_counts_as_valid() {
    let server = server().await;
    let out = tempfile::tempdir().unwrap();
    let bin = tempfile::tempdir().unwrap();
    let config = Config {
        deep_probe: true,
        deep_probe_timeout_secs: 1,
        ffmpeg_path: Some(fake_ffmpeg(bin.path(), "echo out_time_us=500000\nexec sleep 30")),
        ..config(out.path())
    };
    let session = SessionController::from_config(&config).unwrap();

    let good = format!("#EXTINF:-1,Slow But Alive\n{}/live/good.m3u8\n", server.uri());
    session.load(parse_playlist(&good)).unwrap();

    let started = std::time::Instant::now();
    let (summary, verdicts) = finish(session.start().await.unwrap()).await;

    assert_eq!(summary.valid, 1);
    assert_eq!(verdicts, vec![("Slow But Alive".to_string(), Verdict::Valid)]);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn missing_decoder_fails_before_dispatch() {
    let out = tempfile::tempdir().unwrap();
    let config = Config {
        deep_probe: true,
        ffmpeg_path: Some("/nonexistent/ffmpeg".into()),
        ..config(out.path())
    };
    let session = SessionController::from_config(&config).unwrap();
    session
        .load(parse_playlist("http://127.0.0.1:1/a\n"))
        .unwrap();

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, streamcheck::CheckError::MediaProbeUnavailable(_)));
    assert!(!out.path().join("validstreams.m3u").exists());
}
