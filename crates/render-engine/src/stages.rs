//! ffmpeg invocations for the three pipeline stages.

use std::path::{Path, PathBuf};

use fragcut_processing_core::trim::format_secs;
use fragcut_processing_core::TrimPlan;
use serde::Serialize;

use crate::encoder::{CodecFlags, Encoder};
use crate::filters::{AUDIO_OUT, INTRO_AUDIO_OUT, SAMPLE_RATE, VIDEO_OUT};
use crate::probe::parse_frame_rate;
use crate::progress::ProgressScaler;

/// The three encoder invocations of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Core,
    Intro,
    Assembly,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Core => "core",
            Stage::Intro => "intro",
            Stage::Assembly => "assembly",
        }
    }

    /// Human-readable phase shown next to progress.
    pub fn phase(self) -> &'static str {
        match self {
            Stage::Core => "Rendering clip",
            Stage::Intro => "Rendering intro",
            Stage::Assembly => "Assembling",
        }
    }

    pub fn scaler(self) -> ProgressScaler {
        match self {
            Stage::Core => ProgressScaler::CORE,
            Stage::Intro => ProgressScaler::INTRO,
            Stage::Assembly => ProgressScaler::ASSEMBLY,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One ffmpeg run, fully specified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRequest {
    pub stage: Stage,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// File the stage promises to write.
    pub output_path: PathBuf,
    /// Expected output duration, used for progress and the stall limit.
    pub expected_secs: f64,
    /// Encoder used, `None` for stream copy.
    pub encoder: Option<Encoder>,
    /// Directory the finished video is published into. Its volume is
    /// watched for free space alongside the stage's own output.
    pub publish_dir: Option<PathBuf>,
}

fn common_prefix() -> Vec<String> {
    [
        "-hide_banner",
        "-y",
        "-nostdin",
        "-loglevel",
        "warning",
        "-progress",
        "pipe:1",
        "-nostats",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn audio_flags(audio_kbps: u32) -> Vec<String> {
    vec![
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        format!("{audio_kbps}k"),
        "-ar".into(),
        SAMPLE_RATE.to_string(),
        "-ac".into(),
        "2".into(),
    ]
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Inputs and flags of the core render.
#[derive(Debug, Clone, Copy)]
pub struct CoreArgs<'a> {
    pub source: &'a Path,
    pub trim: &'a TrimPlan,
    pub caption: Option<&'a Path>,
    pub music: Option<&'a Path>,
    pub filter_script: &'a Path,
    pub codec: &'a CodecFlags,
    pub audio_kbps: u32,
    pub output: &'a Path,
}

/// Stage 1 argv. Input order is source, caption, music; the graph refers to
/// them by the same indices.
pub fn core_args(a: &CoreArgs<'_>) -> Vec<String> {
    let mut args = common_prefix();
    args.extend([
        "-ss".into(),
        format_secs(a.trim.seek_secs),
        "-t".into(),
        format_secs(a.trim.input_secs),
        "-i".into(),
        path_arg(a.source),
    ]);
    for extra in [a.caption, a.music].into_iter().flatten() {
        args.extend(["-i".into(), path_arg(extra)]);
    }
    args.extend([
        "-filter_complex_script".into(),
        path_arg(a.filter_script),
        "-map".into(),
        format!("[{VIDEO_OUT}]"),
        "-map".into(),
        format!("[{AUDIO_OUT}]"),
    ]);
    args.extend(a.codec.args.iter().cloned());
    args.extend(audio_flags(a.audio_kbps));
    args.extend(["-movflags".into(), "+faststart".into(), path_arg(a.output)]);
    args
}

/// Input indices matching [`core_args`].
pub fn core_input_indices(has_caption: bool, has_music: bool) -> (Option<usize>, Option<usize>) {
    let caption = has_caption.then_some(1);
    let music = has_music.then_some(1 + usize::from(has_caption));
    (caption, music)
}

/// Inputs and flags of the intro render.
#[derive(Debug, Clone, Copy)]
pub struct IntroArgs<'a> {
    pub source: &'a Path,
    pub seek_secs: f64,
    pub duration_secs: f64,
    pub caption: Option<&'a Path>,
    pub filter_script: &'a Path,
    pub codec: &'a CodecFlags,
    pub audio_kbps: u32,
    pub output: &'a Path,
}

/// Stage 2 argv.
pub fn intro_args(a: &IntroArgs<'_>) -> Vec<String> {
    let mut args = common_prefix();
    args.extend([
        "-ss".into(),
        format_secs(a.seek_secs),
        "-i".into(),
        path_arg(a.source),
    ]);
    if let Some(caption) = a.caption {
        args.extend(["-i".into(), path_arg(caption)]);
    }
    args.extend([
        "-filter_complex_script".into(),
        path_arg(a.filter_script),
        "-map".into(),
        format!("[{VIDEO_OUT}]"),
        "-map".into(),
        format!("[{INTRO_AUDIO_OUT}]"),
    ]);
    args.extend(a.codec.args.iter().cloned());
    args.extend(audio_flags(a.audio_kbps));
    args.extend([
        "-t".into(),
        format_secs(a.duration_secs),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(a.output),
    ]);
    args
}

/// MP4 video timescale for a frame rate.
pub fn video_timescale(fps: f64) -> u32 {
    if fps >= 100.0 {
        120_000
    } else {
        60_000
    }
}

/// Concat-demuxer list with one `file` line per entry.
pub fn concat_list(entries: &[&Path]) -> String {
    entries
        .iter()
        .map(|path| {
            let escaped = path.to_string_lossy().replace('\'', "'\\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

/// Inputs and flags of the final assembly.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyArgs<'a> {
    pub concat_list: &'a Path,
    pub input_count: usize,
    /// Encoder flags for the re-encode; ignored when there is one input.
    pub codec: &'a CodecFlags,
    pub fps_expr: &'a str,
    pub audio_kbps: u32,
    pub output: &'a Path,
}

impl AssemblyArgs<'_> {
    pub fn stream_copy(&self) -> bool {
        self.input_count <= 1
    }
}

/// Stage 3 argv. A single input is stream-copied; anything else is
/// re-encoded at a forced constant frame rate.
pub fn assembly_args(a: &AssemblyArgs<'_>) -> Vec<String> {
    let mut args = common_prefix();
    args.extend([
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        path_arg(a.concat_list),
    ]);
    if a.stream_copy() {
        args.extend(["-c".into(), "copy".into()]);
    } else {
        args.extend(a.codec.args.iter().cloned());
        args.extend([
            "-fps_mode".into(),
            "cfr".into(),
            "-r".into(),
            a.fps_expr.to_string(),
        ]);
        args.extend(audio_flags(a.audio_kbps));
    }
    let fps = parse_frame_rate(a.fps_expr).unwrap_or(30.0);
    args.extend([
        "-video_track_timescale".into(),
        video_timescale(fps).to_string(),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(a.output),
    ]);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::codec_flags;
    use fragcut_processing_core::plan_trim;

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_core_args_without_fades() {
        let trim = plan_trim(5_000, 15_000, Some(30.0), true);
        let codec = codec_flags(Encoder::X264, Some(36_000), "60/1");
        let args = core_args(&CoreArgs {
            source: Path::new("/in/clip.mp4"),
            trim: &trim,
            caption: None,
            music: None,
            filter_script: Path::new("/tmp/j/f.txt"),
            codec: &codec,
            audio_kbps: 192,
            output: Path::new("/tmp/j/core.mp4"),
        });
        assert_eq!(value_after(&args, "-ss"), Some("5.000"));
        assert_eq!(value_after(&args, "-t"), Some("10.000"));
        assert_eq!(value_after(&args, "-progress"), Some("pipe:1"));
        assert_eq!(value_after(&args, "-filter_complex_script"), Some("/tmp/j/f.txt"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-b:a"), Some("192k"));
        assert_eq!(value_after(&args, "-ar"), Some("48000"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/j/core.mp4"));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
    }

    #[test]
    fn test_core_input_order() {
        assert_eq!(core_input_indices(false, false), (None, None));
        assert_eq!(core_input_indices(true, false), (Some(1), None));
        assert_eq!(core_input_indices(false, true), (None, Some(1)));
        assert_eq!(core_input_indices(true, true), (Some(1), Some(2)));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[Path::new("/tmp/j/intro.mp4"), Path::new("/tmp/it's/core.mp4")]);
        assert_eq!(
            list,
            "file '/tmp/j/intro.mp4'\nfile '/tmp/it'\\''s/core.mp4'\n"
        );
    }

    #[test]
    fn test_assembly_copy_vs_reencode() {
        let codec = codec_flags(Encoder::Nvenc, Some(8_000), "120/1");
        let single = assembly_args(&AssemblyArgs {
            concat_list: Path::new("/tmp/j/concat.txt"),
            input_count: 1,
            codec: &codec,
            fps_expr: "120/1",
            audio_kbps: 192,
            output: Path::new("/tmp/j/final.mp4"),
        });
        assert_eq!(value_after(&single, "-c"), Some("copy"));
        assert!(!single.iter().any(|a| a == "-c:v"));
        assert_eq!(value_after(&single, "-video_track_timescale"), Some("120000"));

        let double = assembly_args(&AssemblyArgs {
            concat_list: Path::new("/tmp/j/concat.txt"),
            input_count: 2,
            codec: &codec,
            fps_expr: "60000/1001",
            audio_kbps: 192,
            output: Path::new("/tmp/j/final.mp4"),
        });
        assert_eq!(value_after(&double, "-c:v"), Some("h264_nvenc"));
        assert_eq!(value_after(&double, "-fps_mode"), Some("cfr"));
        assert_eq!(value_after(&double, "-r"), Some("60000/1001"));
        assert_eq!(value_after(&double, "-video_track_timescale"), Some("60000"));
        assert_eq!(value_after(&double, "-movflags"), Some("+faststart"));
    }
}
