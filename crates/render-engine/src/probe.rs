//! Media probing through `ffprobe`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use fragcut_common::{FragcutError, FragcutResult};
use fragcut_job_model::Resolution;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::process::configure_background;

/// Default wall-clock limit for one probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Video stream facts the pipeline plans with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    /// Frame rate as ffprobe reports it, e.g. `"60000/1001"`.
    pub fps_expr: String,
    pub has_audio: bool,
    pub audio_sample_rate: Option<u32>,
    /// Container size in bytes; 0 when unknown.
    pub size_bytes: u64,
}

impl VideoInfo {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Frame rate as a float, 30 when the expression is unusable.
    pub fn fps(&self) -> f64 {
        parse_frame_rate(&self.fps_expr).unwrap_or(30.0)
    }
}

/// Queries the pipeline needs answered about media files.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Stream layout of a video. Fails if there is no video stream.
    async fn probe_video(&self, path: &Path) -> FragcutResult<VideoInfo>;

    /// Audio bitrate in kbps: stream level first, then container level.
    async fn probe_audio_bitrate(&self, path: &Path) -> Option<u32>;

    /// Audio duration in seconds; 0.0 when it cannot be determined.
    async fn probe_audio_duration(&self, path: &Path) -> f64;
}

/// [`MediaProbe`] backed by an `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

impl FfprobeProber {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run ffprobe and parse its JSON. Any failure, including a timeout or
    /// a non-zero exit, is reported as an error message.
    async fn query(&self, args: &[&str], path: &Path) -> Result<ProbeOutput, String> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-print_format", "json"])
            .args(args)
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        configure_background(&mut cmd);

        tracing::debug!(ffprobe = %self.ffprobe.display(), ?args, path = %path.display(), "Running ffprobe");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("failed to start ffprobe: {e}")),
            Err(_) => return Err(format!("ffprobe timed out after {:?}", self.timeout)),
        };
        if !output.status.success() {
            return Err(format!("ffprobe exited with {}", output.status));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| format!("unparseable ffprobe output: {e}"))
    }
}

#[async_trait]
impl MediaProbe for FfprobeProber {
    async fn probe_video(&self, path: &Path) -> FragcutResult<VideoInfo> {
        let probe = self
            .query(&["-show_format", "-show_streams"], path)
            .await
            .map_err(FragcutError::probe_failed)?;
        video_info_from(probe)
    }

    async fn probe_audio_bitrate(&self, path: &Path) -> Option<u32> {
        let probe = self
            .query(
                &["-select_streams", "a:0", "-show_entries", "stream=bit_rate:format=bit_rate"],
                path,
            )
            .await
            .map_err(|e| tracing::debug!(path = %path.display(), error = %e, "Audio bitrate probe failed"))
            .ok()?;
        audio_kbps_from(&probe)
    }

    async fn probe_audio_duration(&self, path: &Path) -> f64 {
        match self
            .query(&["-show_entries", "format=duration:stream=duration"], path)
            .await
        {
            Ok(probe) => audio_duration_from(&probe),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Audio duration probe failed");
                0.0
            }
        }
    }
}

fn parse_f64(value: Option<&String>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn video_info_from(probe: ProbeOutput) -> FragcutResult<VideoInfo> {
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| FragcutError::probe_failed("no video stream"))?;
    let audio = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(FragcutError::probe_failed("video stream has no dimensions")),
    };

    let duration_secs = probe
        .format
        .as_ref()
        .and_then(|f| parse_f64(f.duration.as_ref()))
        .or_else(|| parse_f64(video.duration.as_ref()))
        .ok_or_else(|| FragcutError::probe_failed("unknown duration"))?;

    let fps_expr = [video.avg_frame_rate.as_ref(), video.r_frame_rate.as_ref()]
        .into_iter()
        .flatten()
        .find(|expr| parse_frame_rate(expr).is_some())
        .cloned()
        .unwrap_or_else(|| "30/1".to_string());

    Ok(VideoInfo {
        duration_secs,
        width,
        height,
        fps_expr,
        has_audio: audio.is_some(),
        audio_sample_rate: audio
            .and_then(|a| a.sample_rate.as_ref())
            .and_then(|r| r.parse().ok()),
        size_bytes: probe
            .format
            .as_ref()
            .and_then(|f| f.size.as_ref())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    })
}

fn audio_kbps_from(probe: &ProbeOutput) -> Option<u32> {
    let stream = probe.streams.first().and_then(|s| parse_f64(s.bit_rate.as_ref()));
    let format = probe.format.as_ref().and_then(|f| parse_f64(f.bit_rate.as_ref()));
    stream
        .or(format)
        .map(|bps| (bps / 1000.0).round() as u32)
        .filter(|kbps| *kbps > 0)
}

fn audio_duration_from(probe: &ProbeOutput) -> f64 {
    probe
        .format
        .as_ref()
        .and_then(|f| parse_f64(f.duration.as_ref()))
        .or_else(|| probe.streams.iter().find_map(|s| parse_f64(s.duration.as_ref())))
        .unwrap_or(0.0)
}

/// Parse `"num/den"` or a plain number into frames per second.
pub fn parse_frame_rate(expr: &str) -> Option<f64> {
    let expr = expr.trim();
    let fps = match expr.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => expr.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
