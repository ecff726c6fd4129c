//! Background music placement and ducking.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Sidechain compressor settings applied to the music leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuckParams {
    /// Linear trigger threshold (ffmpeg range 0.000976563..1).
    pub threshold: f64,
    /// Compression ratio (ffmpeg range 1..20).
    pub ratio: f64,
}

impl Default for DuckParams {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            ratio: 8.0,
        }
    }
}

impl DuckParams {
    /// Clamp both parameters into the ranges `sidechaincompress` accepts.
    pub fn sanitized(self) -> Self {
        Self {
            threshold: self.threshold.clamp(0.000_976_563, 1.0),
            ratio: self.ratio.clamp(1.0, 20.0),
        }
    }
}

/// Music settings as authored in the editor.
///
/// Timeline bounds are source-absolute milliseconds (the same clock as the
/// job's trim points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicConfig {
    /// Where playback starts inside the music file, in seconds.
    pub file_offset_s: Option<f64>,

    /// Gain applied to the game audio when music is mixed in.
    pub video_volume: f64,

    /// Ducking parameters.
    pub duck: DuckParams,

    /// Carve a presence dip into the music so game audio stays intelligible.
    pub enable_eq: bool,

    /// First source millisecond the music covers.
    pub timeline_start_ms: Option<u64>,

    /// Last source millisecond the music covers.
    pub timeline_end_ms: Option<u64>,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            file_offset_s: None,
            video_volume: 1.0,
            duck: DuckParams::default(),
            enable_eq: false,
            timeline_start_ms: None,
            timeline_end_ms: None,
        }
    }
}

/// Music settings after merging job-level fields with `MusicConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMusic {
    pub path: PathBuf,
    pub file_offset_s: f64,
    pub volume: f64,
    pub video_volume: f64,
    /// Source-absolute window `[start, end)` in milliseconds, already
    /// intersected with the job's trim window.
    pub timeline_ms: (u64, u64),
    pub duck: DuckParams,
    pub enable_eq: bool,
}
