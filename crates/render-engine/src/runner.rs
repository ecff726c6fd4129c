//! Stage execution: one ffmpeg child with progress, watchdog and kill.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fragcut_common::config::WatchdogConfig;
use fragcut_common::{FragcutError, FragcutResult};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::MissedTickBehavior;

use crate::control::JobControl;
use crate::process::{configure_background, free_disk_mb};
use crate::progress::ProgressState;
use crate::stages::StageRequest;

/// Error lines kept for the failure message.
pub const ERROR_TAIL_LINES: usize = 5;

/// Why the runner stopped a stage early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAbort {
    Cancelled,
    DiskFull { free_mb: u64 },
    Stalled { idle_secs: u64 },
}

/// What happened to a stage. Success is judged by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub exit_code: Option<i32>,
    /// Last stage-local progress percent reported.
    pub progress: u8,
    /// Error-looking stderr lines, newest last.
    pub error_tail: String,
    pub abort: Option<StageAbort>,
}

impl StageOutcome {
    pub fn exited_cleanly(&self) -> bool {
        self.abort.is_none() && self.exit_code == Some(0)
    }
}

/// Runs one stage to completion.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Spawn and supervise `request`. Stage-local progress (0..=100) goes
    /// to `on_progress`. Only failures to run at all are errors; a non-zero
    /// exit is reported in the outcome.
    async fn run(
        &self,
        request: &StageRequest,
        control: &JobControl,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> FragcutResult<StageOutcome>;

    fn name(&self) -> &str;
}

/// Watchdog thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogLimits {
    pub min_free_disk_mb: u64,
    pub tick: Duration,
    pub min_stall: Duration,
}

impl Default for WatchdogLimits {
    fn default() -> Self {
        Self::from(&WatchdogConfig::default())
    }
}

impl From<&WatchdogConfig> for WatchdogLimits {
    fn from(config: &WatchdogConfig) -> Self {
        Self {
            min_free_disk_mb: config.min_free_disk_mb,
            tick: Duration::from_millis(config.tick_ms.max(10)),
            min_stall: Duration::from_secs(config.min_stall_secs),
        }
    }
}

impl WatchdogLimits {
    /// Silence allowed before a stage counts as stalled:
    /// `max(min_stall, 3 * expected + min_stall)`.
    pub fn stall_limit(&self, expected_secs: f64) -> Duration {
        let scaled = Duration::from_secs_f64(3.0 * expected_secs.max(0.0)) + self.min_stall;
        scaled.max(self.min_stall)
    }
}

/// Keeps the last few interesting stderr lines.
#[derive(Debug, Default)]
struct ErrorTail {
    matched: VecDeque<String>,
    recent: VecDeque<String>,
}

impl ErrorTail {
    fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let lower = line.to_ascii_lowercase();
        if lower.contains("error") || lower.contains("failed") {
            push_bounded(&mut self.matched, line);
        }
        push_bounded(&mut self.recent, line);
    }

    /// Matched lines, or the last lines of any kind when nothing matched.
    fn text(&self) -> String {
        let source = if self.matched.is_empty() {
            &self.recent
        } else {
            &self.matched
        };
        source.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

fn push_bounded(buf: &mut VecDeque<String>, line: &str) {
    if buf.len() == ERROR_TAIL_LINES {
        buf.pop_front();
    }
    buf.push_back(line.to_string());
}

/// Directories whose volumes must keep `min_free_disk_mb` free while a
/// stage runs: where the stage writes and where the result is published.
pub fn watched_dirs(request: &StageRequest) -> Vec<&Path> {
    let mut dirs: Vec<&Path> = request.output_path.parent().into_iter().collect();
    if let Some(publish) = request.publish_dir.as_deref() {
        if !dirs.contains(&publish) {
            dirs.push(publish);
        }
    }
    dirs
}

fn stop_child(
    child: &mut tokio::process::Child,
    control: &JobControl,
    request: &StageRequest,
    reason: StageAbort,
) {
    tracing::warn!(stage = %request.stage, reason = ?reason, "Stopping stage");
    control.kill_child();
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "Child already gone");
    }
}

/// [`StageRunner`] spawning a real ffmpeg process.
#[derive(Debug, Clone, Default)]
pub struct FfmpegStageRunner {
    limits: WatchdogLimits,
}

impl FfmpegStageRunner {
    pub fn new(limits: WatchdogLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &WatchdogLimits {
        &self.limits
    }

    fn check_watchdog(
        &self,
        request: &StageRequest,
        control: &JobControl,
        last_output: Instant,
    ) -> Option<StageAbort> {
        if control.is_cancelled() {
            return Some(StageAbort::Cancelled);
        }
        if let Some(free_mb) = watched_dirs(request)
            .into_iter()
            .filter_map(free_disk_mb)
            .find(|free| *free < self.limits.min_free_disk_mb)
        {
            return Some(StageAbort::DiskFull { free_mb });
        }
        let idle = last_output.elapsed();
        if idle > self.limits.stall_limit(request.expected_secs) {
            return Some(StageAbort::Stalled {
                idle_secs: idle.as_secs(),
            });
        }
        None
    }
}

#[async_trait]
impl StageRunner for FfmpegStageRunner {
    async fn run(
        &self,
        request: &StageRequest,
        control: &JobControl,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> FragcutResult<StageOutcome> {
        tracing::debug!(
            stage = %request.stage,
            program = %request.program.display(),
            args = %request.args.join(" "),
            "Spawning stage"
        );

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        configure_background(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            FragcutError::internal(format!(
                "Failed to start {}: {e}",
                request.program.display()
            ))
        })?;
        if let Some(pid) = child.id() {
            control.attach_child(pid);
            tracing::info!(stage = %request.stage, pid, encoder = ?request.encoder, "Stage started");
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FragcutError::internal("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FragcutError::internal("Failed to capture ffmpeg stderr"))?;
        let mut stdout = BufReader::new(stdout).lines();
        let mut stderr = BufReader::new(stderr).lines();
        let mut stdout_open = true;
        let mut stderr_open = true;

        let mut ticker = tokio::time::interval(self.limits.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Instant::now();
        let mut last_output = Instant::now();
        let mut state = ProgressState::default();
        let mut progress = 0u8;
        let mut tail = ErrorTail::default();
        let mut abort = None;

        while stdout_open || stderr_open {
            tokio::select! {
                line = stdout.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        last_output = Instant::now();
                        if state.update_line(&line) {
                            progress = state.percent(request.expected_secs);
                            on_progress(progress);
                        }
                    }
                    _ => stdout_open = false,
                },
                line = stderr.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        last_output = Instant::now();
                        tail.push(&line);
                    }
                    _ => stderr_open = false,
                },
                _ = ticker.tick() => {
                    abort = self.check_watchdog(request, control, last_output);
                }
            }
            if abort.is_none() && control.is_cancelled() {
                abort = Some(StageAbort::Cancelled);
            }
            if abort.is_some() {
                break;
            }
        }

        if let Some(reason) = abort {
            stop_child(&mut child, control, request, reason);
        }

        // A child can close its pipes and keep running; the watchdog stays
        // on until it exits.
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = ticker.tick(), if abort.is_none() => {
                    abort = self.check_watchdog(request, control, last_output);
                    if let Some(reason) = abort {
                        stop_child(&mut child, control, request, reason);
                    }
                }
            }
        };
        control.detach_child();

        let outcome = StageOutcome {
            exit_code: status.code(),
            progress,
            error_tail: tail.text(),
            abort,
        };
        tracing::info!(
            stage = %request.stage,
            exit_code = ?outcome.exit_code,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Stage finished"
        );
        Ok(outcome)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stall_limit() {
        let limits = WatchdogLimits::default();
        assert_eq!(limits.stall_limit(0.0), Duration::from_secs(120));
        assert_eq!(limits.stall_limit(10.0), Duration::from_secs(150));
        assert_eq!(limits.stall_limit(-5.0), Duration::from_secs(120));
    }

    #[test]
    fn test_error_tail_prefers_error_lines() {
        let mut tail = ErrorTail::default();
        tail.push("Stream mapping:");
        tail.push("[h264_nvenc] OpenEncodeSessionEx failed: out of memory");
        tail.push("Error initializing output stream 0:0");
        tail.push("Conversion failed!");
        assert_eq!(
            tail.text(),
            "[h264_nvenc] OpenEncodeSessionEx failed: out of memory\n\
             Error initializing output stream 0:0\n\
             Conversion failed!"
        );

        let mut quiet = ErrorTail::default();
        quiet.push("only noise");
        assert_eq!(quiet.text(), "only noise");
    }

    #[test]
    fn test_error_tail_is_bounded() {
        let mut tail = ErrorTail::default();
        for i in 0..20 {
            tail.push(&format!("error {i}"));
        }
        assert_eq!(tail.text().lines().count(), ERROR_TAIL_LINES);
        assert!(tail.text().ends_with("error 19"));
    }

    fn request(output: &str, publish: Option<&str>) -> StageRequest {
        StageRequest {
            stage: crate::stages::Stage::Core,
            program: "ffmpeg".into(),
            args: Vec::new(),
            output_path: output.into(),
            expected_secs: 10.0,
            encoder: None,
            publish_dir: publish.map(Into::into),
        }
    }

    #[test]
    fn test_watchdog_covers_work_and_publish_volumes() {
        let both = request("/tmp/fragcut-1/core.mp4", Some("/home/me/Videos"));
        assert_eq!(
            watched_dirs(&both),
            vec![Path::new("/tmp/fragcut-1"), Path::new("/home/me/Videos")]
        );

        let same = request("/data/out/final.mp4", Some("/data/out"));
        assert_eq!(watched_dirs(&same), vec![Path::new("/data/out")]);

        let work_only = request("/tmp/fragcut-1/intro.mp4", None);
        assert_eq!(watched_dirs(&work_only), vec![Path::new("/tmp/fragcut-1")]);
    }

    #[test]
    fn test_clean_exit() {
        let outcome = StageOutcome {
            exit_code: Some(0),
            progress: 100,
            error_tail: String::new(),
            abort: None,
        };
        assert!(outcome.exited_cleanly());
        let cancelled = StageOutcome {
            abort: Some(StageAbort::Cancelled),
            ..outcome
        };
        assert!(!cancelled.exited_cleanly());
    }
}
