//! H.264 encoder selection, flag sets, and fallback.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;

use fragcut_common::{FragcutError, FragcutResult};
use fragcut_job_model::HardwareStrategy;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::probe::parse_frame_rate;
use crate::process::configure_background;

/// One of the supported H.264 encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoder {
    #[serde(rename = "h264_nvenc")]
    Nvenc,
    #[serde(rename = "h264_amf")]
    Amf,
    #[serde(rename = "h264_qsv")]
    Qsv,
    #[serde(rename = "libx264")]
    X264,
}

impl Encoder {
    pub const ALL: [Encoder; 4] = [Encoder::Nvenc, Encoder::Amf, Encoder::Qsv, Encoder::X264];

    /// ffmpeg codec name.
    pub fn name(self) -> &'static str {
        match self {
            Encoder::Nvenc => "h264_nvenc",
            Encoder::Amf => "h264_amf",
            Encoder::Qsv => "h264_qsv",
            Encoder::X264 => "libx264",
        }
    }

    pub fn is_hardware(self) -> bool {
        !matches!(self, Encoder::X264)
    }

    /// Encoder a hardware strategy starts with.
    pub fn for_strategy(strategy: HardwareStrategy) -> Self {
        match strategy {
            HardwareStrategy::Nvidia => Encoder::Nvenc,
            HardwareStrategy::Amd => Encoder::Amf,
            HardwareStrategy::Intel => Encoder::Qsv,
            HardwareStrategy::Cpu => Encoder::X264,
        }
    }
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoder {
    type Err = FragcutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Encoder::ALL
            .into_iter()
            .find(|e| e.name() == s.trim())
            .ok_or_else(|| FragcutError::config(format!("unknown encoder '{s}'")))
    }
}

/// Parse an encoder preference list from configuration.
pub fn parse_preference(names: &[String]) -> FragcutResult<Vec<Encoder>> {
    let mut order: Vec<Encoder> = Vec::with_capacity(names.len());
    for name in names {
        let encoder: Encoder = name.parse()?;
        if !order.contains(&encoder) {
            order.push(encoder);
        }
    }
    if order.is_empty() {
        return Err(FragcutError::config("encoder preference list is empty"));
    }
    Ok(order)
}

/// Encoder-specific output arguments plus a short description for logs.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecFlags {
    pub args: Vec<String>,
    pub label: String,
}

/// H.264 level for the frame rate.
pub fn h264_level(fps: f64) -> &'static str {
    if fps >= 100.0 {
        "5.1"
    } else {
        "4.2"
    }
}

/// One second of frames.
pub fn gop_frames(fps: f64) -> u32 {
    (fps.round() as u32).max(1)
}

fn push(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Full-quality flags for the core and assembly stages.
///
/// `video_kbps = None` selects constant-quality mode.
pub fn codec_flags(encoder: Encoder, video_kbps: Option<u32>, fps_expr: &str) -> CodecFlags {
    let fps = parse_frame_rate(fps_expr).unwrap_or(30.0);
    let gop = gop_frames(fps).to_string();
    let level = h264_level(fps);
    let mut args: Vec<String> = vec!["-c:v".into(), encoder.name().into()];

    let rate = video_kbps.map(|kbps| {
        (
            format!("{kbps}k"),
            format!("{}k", kbps.saturating_mul(3) / 2),
            format!("{}k", kbps.saturating_mul(2)),
        )
    });

    let label = match (encoder, &rate) {
        (Encoder::Nvenc, Some((b, max, buf))) => {
            push(&mut args, &["-preset", "p7", "-tune", "hq", "-rc", "vbr", "-multipass", "fullres"]);
            push(&mut args, &["-b:v", b, "-maxrate", max, "-bufsize", buf]);
            push(&mut args, &["-spatial_aq", "1", "-temporal_aq", "1", "-bf", "3", "-rc-lookahead", "32"]);
            format!("NVENC VBR {b}")
        }
        (Encoder::Nvenc, None) => {
            push(&mut args, &["-preset", "p7", "-tune", "hq", "-rc", "vbr", "-cq", "19", "-b:v", "0"]);
            push(&mut args, &["-spatial_aq", "1", "-temporal_aq", "1", "-bf", "3", "-rc-lookahead", "32"]);
            "NVENC CQ 19".to_string()
        }
        (Encoder::Amf, Some((b, max, buf))) => {
            push(&mut args, &["-quality", "quality", "-rc", "vbr_peak"]);
            push(&mut args, &["-b:v", b, "-maxrate", max, "-bufsize", buf, "-vbaq", "true"]);
            format!("AMF VBR peak {b}")
        }
        (Encoder::Amf, None) => {
            push(&mut args, &["-quality", "quality", "-rc", "cqp", "-qp_i", "18", "-qp_p", "20", "-qp_b", "22"]);
            "AMF CQP 18/20".to_string()
        }
        (Encoder::Qsv, Some((b, max, buf))) => {
            push(&mut args, &["-preset", "slow", "-look_ahead", "1", "-look_ahead_depth", "40"]);
            push(&mut args, &["-b:v", b, "-maxrate", max, "-bufsize", buf]);
            format!("QSV lookahead {b}")
        }
        (Encoder::Qsv, None) => {
            push(&mut args, &["-preset", "slow", "-look_ahead", "1", "-global_quality", "20"]);
            "QSV ICQ 20".to_string()
        }
        (Encoder::X264, Some((b, max, buf))) => {
            push(&mut args, &["-preset", "slower", "-b:v", b, "-maxrate", max, "-bufsize", buf]);
            push(&mut args, &["-x264-params", "aq-mode=3:aq-strength=0.9:rc-lookahead=60:ref=4:bframes=3"]);
            format!("x264 slower {b}")
        }
        (Encoder::X264, None) => {
            push(&mut args, &["-preset", "slower", "-crf", "18"]);
            push(&mut args, &["-x264-params", "aq-mode=3:aq-strength=0.9:rc-lookahead=60:ref=4:bframes=3"]);
            "x264 CRF 18".to_string()
        }
    };

    push(&mut args, &["-profile:v", "high", "-level:v", level, "-g", &gop, "-pix_fmt", "yuv420p"]);
    CodecFlags { args, label }
}

/// Reduced flag set for the still-frame intro.
pub fn intro_codec_flags(encoder: Encoder, fps_expr: &str) -> CodecFlags {
    let fps = parse_frame_rate(fps_expr).unwrap_or(30.0);
    let gop = gop_frames(fps).to_string();
    let mut args: Vec<String> = vec!["-c:v".into(), encoder.name().into()];
    match encoder {
        Encoder::Nvenc => push(&mut args, &["-preset", "p4", "-rc", "vbr", "-cq", "21", "-b:v", "0"]),
        Encoder::Amf => push(&mut args, &["-quality", "balanced", "-rc", "cqp", "-qp_i", "20", "-qp_p", "22"]),
        Encoder::Qsv => push(&mut args, &["-preset", "medium", "-global_quality", "22"]),
        Encoder::X264 => push(&mut args, &["-preset", "veryfast", "-crf", "20"]),
    }
    push(&mut args, &["-profile:v", "high", "-level:v", h264_level(fps), "-g", &gop, "-pix_fmt", "yuv420p"]);
    CodecFlags {
        args,
        label: format!("{} intro", encoder.name()),
    }
}

/// Tracks encoder attempts for one job.
#[derive(Debug, Clone)]
pub struct EncoderSelector {
    preference: Vec<Encoder>,
    fallback_enabled: bool,
    attempted: Vec<Encoder>,
}

impl EncoderSelector {
    /// `CPU` pins the job to libx264 with no fallback.
    pub fn new(preference: Vec<Encoder>, strategy: HardwareStrategy) -> Self {
        Self {
            preference,
            fallback_enabled: strategy != HardwareStrategy::Cpu,
            attempted: Vec::new(),
        }
    }

    /// Where a job with this strategy starts.
    ///
    /// Strategy encoders missing from the preference list start at its head.
    pub fn initial_encoder(&self, strategy: HardwareStrategy) -> Encoder {
        let wanted = Encoder::for_strategy(strategy);
        if strategy == HardwareStrategy::Cpu || self.preference.contains(&wanted) {
            wanted
        } else {
            self.preference.first().copied().unwrap_or(Encoder::X264)
        }
    }

    /// Note that `encoder` is about to be tried.
    pub fn record_attempt(&mut self, encoder: Encoder) {
        if !self.attempted.contains(&encoder) {
            self.attempted.push(encoder);
        }
    }

    pub fn attempted(&self) -> &[Encoder] {
        &self.attempted
    }

    /// Encoders after `failed` in preference order that were not tried yet.
    pub fn fallback_list(&self, failed: Encoder) -> Vec<Encoder> {
        if !self.fallback_enabled {
            return Vec::new();
        }
        let after = self
            .preference
            .iter()
            .position(|e| *e == failed)
            .map_or(0, |i| i + 1);
        self.preference[after..]
            .iter()
            .copied()
            .filter(|e| !self.attempted.contains(e))
            .collect()
    }

    /// The next candidate after `failed`, if any remain.
    pub fn next_after(&self, failed: Encoder) -> Option<Encoder> {
        self.fallback_list(failed).into_iter().next()
    }
}

/// Which of the four supported encoders the given ffmpeg was built with.
pub async fn list_h264_encoders(ffmpeg: &Path) -> FragcutResult<Vec<Encoder>> {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-encoders"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    configure_background(&mut cmd);

    let output = tokio::time::timeout(std::time::Duration::from_secs(10), cmd.output())
        .await
        .map_err(|_| FragcutError::internal("ffmpeg -encoders timed out"))??;
    if !output.status.success() {
        return Err(FragcutError::internal(format!(
            "ffmpeg -encoders exited with {}",
            output.status
        )));
    }
    Ok(parse_encoder_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Pick supported encoders out of `ffmpeg -encoders` output.
pub fn parse_encoder_list(listing: &str) -> Vec<Encoder> {
    let names: Vec<&str> = listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            flags.starts_with('V').then_some(name)
        })
        .collect();
    Encoder::ALL
        .into_iter()
        .filter(|e| names.contains(&e.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_selector(strategy: HardwareStrategy) -> EncoderSelector {
        EncoderSelector::new(Encoder::ALL.to_vec(), strategy)
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_initial_encoder_per_strategy() {
        let selector = default_selector(HardwareStrategy::Nvidia);
        assert_eq!(selector.initial_encoder(HardwareStrategy::Nvidia), Encoder::Nvenc);
        assert_eq!(selector.initial_encoder(HardwareStrategy::Intel), Encoder::Qsv);
        assert_eq!(selector.initial_encoder(HardwareStrategy::Cpu), Encoder::X264);
    }

    #[test]
    fn test_fallback_walks_preference_order() {
        let mut selector = default_selector(HardwareStrategy::Nvidia);
        selector.record_attempt(Encoder::Nvenc);
        assert_eq!(
            selector.fallback_list(Encoder::Nvenc),
            vec![Encoder::Amf, Encoder::Qsv, Encoder::X264]
        );
        selector.record_attempt(Encoder::Amf);
        assert_eq!(selector.next_after(Encoder::Amf), Some(Encoder::Qsv));
        selector.record_attempt(Encoder::Qsv);
        selector.record_attempt(Encoder::X264);
        assert_eq!(selector.next_after(Encoder::X264), None);
    }

    #[test]
    fn test_cpu_strategy_disables_fallback() {
        let mut selector = default_selector(HardwareStrategy::Cpu);
        selector.record_attempt(Encoder::X264);
        assert!(selector.fallback_list(Encoder::X264).is_empty());
    }

    #[test]
    fn test_nvenc_flags() {
        let flags = codec_flags(Encoder::Nvenc, Some(8_000), "60/1");
        assert_eq!(value_after(&flags.args, "-rc"), Some("vbr"));
        assert_eq!(value_after(&flags.args, "-multipass"), Some("fullres"));
        assert_eq!(value_after(&flags.args, "-bf"), Some("3"));
        assert_eq!(value_after(&flags.args, "-rc-lookahead"), Some("32"));
        assert_eq!(value_after(&flags.args, "-b:v"), Some("8000k"));
        assert_eq!(value_after(&flags.args, "-level:v"), Some("4.2"));
        assert_eq!(value_after(&flags.args, "-g"), Some("60"));
    }

    #[test]
    fn test_high_frame_rate_level() {
        let flags = codec_flags(Encoder::X264, Some(8_000), "120/1");
        assert_eq!(value_after(&flags.args, "-level:v"), Some("5.1"));
        assert_eq!(value_after(&flags.args, "-preset"), Some("slower"));
        assert!(value_after(&flags.args, "-x264-params").is_some());
    }

    #[test]
    fn test_amf_and_qsv_flags() {
        let amf = codec_flags(Encoder::Amf, Some(5_000), "30/1");
        assert_eq!(value_after(&amf.args, "-rc"), Some("vbr_peak"));
        assert_eq!(value_after(&amf.args, "-vbaq"), Some("true"));
        let qsv = codec_flags(Encoder::Qsv, Some(5_000), "30/1");
        assert_eq!(value_after(&qsv.args, "-preset"), Some("slow"));
        assert_eq!(value_after(&qsv.args, "-look_ahead"), Some("1"));
    }

    #[test]
    fn test_constant_quality_has_no_target_bitrate() {
        let flags = codec_flags(Encoder::X264, None, "60000/1001");
        assert_eq!(value_after(&flags.args, "-crf"), Some("18"));
        assert_eq!(value_after(&flags.args, "-b:v"), None);
    }

    #[test]
    fn test_parse_encoder_list() {
        let listing = "Encoders:\n V....D libx264              libx264 H.264 / AVC\n V....D h264_nvenc           NVIDIA NVENC H.264 encoder\n A....D aac                  AAC\n";
        assert_eq!(parse_encoder_list(listing), vec![Encoder::Nvenc, Encoder::X264]);
    }

    #[test]
    fn test_preference_parsing() {
        let names = vec!["libx264".to_string(), "h264_qsv".to_string(), "libx264".to_string()];
        assert_eq!(parse_preference(&names).unwrap(), vec![Encoder::X264, Encoder::Qsv]);
        assert!(parse_preference(&["h265".to_string()]).is_err());
    }
}
