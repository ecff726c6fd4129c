//! `FfmpegStageRunner` against scripted shell children.
//!
//! `/bin/sh` stands in for ffmpeg: the scripts print `-progress` style
//! lines on stdout and diagnostics on stderr.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fragcut_render_engine::{
    FfmpegStageRunner, JobControl, Stage, StageAbort, StageRequest, StageRunner, WatchdogLimits,
};
use tempfile::TempDir;

fn limits() -> WatchdogLimits {
    WatchdogLimits {
        min_free_disk_mb: 0,
        tick: Duration::from_millis(20),
        min_stall: Duration::from_secs(30),
    }
}

fn shell(script: &str, output: &Path, expected_secs: f64) -> StageRequest {
    StageRequest {
        stage: Stage::Core,
        program: PathBuf::from("/bin/sh"),
        args: vec!["-c".into(), script.into()],
        output_path: output.to_path_buf(),
        expected_secs,
        encoder: None,
        publish_dir: None,
    }
}

#[tokio::test]
async fn test_progress_lines_are_reported() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("core.mp4");
    let script = format!(
        "printf 'frame=10\\nout_time_us=5000000\\nprogress=continue\\n'; \
         printf 'out_time_us=10000000\\nprogress=end\\n'; \
         printf data > '{}'",
        output.display()
    );
    let seen = Mutex::new(Vec::new());
    let record = |p: u8| seen.lock().unwrap().push(p);

    let runner = FfmpegStageRunner::new(limits());
    let outcome = runner
        .run(&shell(&script, &output, 10.0), &JobControl::new(), &record)
        .await
        .unwrap();

    assert!(outcome.exited_cleanly());
    assert_eq!(outcome.progress, 100);
    assert_eq!(*seen.lock().unwrap(), vec![50, 100]);
    assert!(output.is_file());
}

#[tokio::test]
async fn test_failure_keeps_error_tail() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("core.mp4");
    let script = "echo 'Input #0, mov,mp4' >&2; \
                  echo '[h264_amf] Failed to initialise AMF' >&2; \
                  echo 'Error while opening encoder for output stream #0:0' >&2; \
                  exit 3";

    let runner = FfmpegStageRunner::new(limits());
    let outcome = runner
        .run(&shell(script, &output, 10.0), &JobControl::new(), &|_| {})
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(outcome.abort, None);
    assert!(!outcome.exited_cleanly());
    assert_eq!(
        outcome.error_tail,
        "[h264_amf] Failed to initialise AMF\nError while opening encoder for output stream #0:0"
    );
}

#[tokio::test]
async fn test_cancel_kills_running_child() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("core.mp4");
    let control = Arc::new(JobControl::new());

    let canceller = {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            control.cancel();
        })
    };

    let started = Instant::now();
    let runner = FfmpegStageRunner::new(limits());
    let outcome = runner
        .run(&shell("sleep 30", &output, 10.0), &control, &|_| {})
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(outcome.abort, Some(StageAbort::Cancelled));
    assert_eq!(control.kill_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancel_reaches_child_that_closed_its_pipes() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("core.mp4");
    let control = Arc::new(JobControl::new());

    let canceller = {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            control.cancel();
        })
    };

    let started = Instant::now();
    let runner = FfmpegStageRunner::new(limits());
    let outcome = runner
        .run(
            &shell("exec >/dev/null 2>&1; sleep 30", &output, 10.0),
            &control,
            &|_| {},
        )
        .await
        .unwrap();
    canceller.await.unwrap();

    assert_eq!(outcome.abort, Some(StageAbort::Cancelled));
    assert_eq!(control.kill_count(), 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_silent_child_counts_as_stalled() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("core.mp4");
    let runner = FfmpegStageRunner::new(WatchdogLimits {
        min_stall: Duration::from_millis(200),
        ..limits()
    });

    let started = Instant::now();
    let outcome = runner
        .run(&shell("sleep 30", &output, 0.0), &JobControl::new(), &|_| {})
        .await
        .unwrap();

    assert!(matches!(outcome.abort, Some(StageAbort::Stalled { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_low_disk_aborts_stage() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("core.mp4");
    let runner = FfmpegStageRunner::new(WatchdogLimits {
        min_free_disk_mb: u64::MAX,
        ..limits()
    });

    let outcome = runner
        .run(&shell("sleep 30", &output, 10.0), &JobControl::new(), &|_| {})
        .await
        .unwrap();

    assert!(matches!(outcome.abort, Some(StageAbort::DiskFull { .. })));
}

#[tokio::test]
async fn test_missing_program_is_an_error() {
    let dir = TempDir::new().unwrap();
    let request = StageRequest {
        program: PathBuf::from("/nonexistent/ffmpeg"),
        ..shell("true", &dir.path().join("core.mp4"), 1.0)
    };
    let runner = FfmpegStageRunner::default();
    assert!(runner
        .run(&request, &JobControl::new(), &|_| {})
        .await
        .is_err());
}
