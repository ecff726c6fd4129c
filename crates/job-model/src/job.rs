//! The processing job contract.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geometry::{Resolution, ResolutionParseError};
use crate::hud::HudCoordinates;
use crate::music::{MusicConfig, ResolvedMusic};

/// Slowest allowed retiming factor.
pub const MIN_SPEED: f64 = 0.25;

/// Fastest allowed retiming factor.
pub const MAX_SPEED: f64 = 4.0;

/// Shortest trim window accepted, in milliseconds.
pub const MIN_CLIP_MS: u64 = 500;

/// Target file sizes for quality levels 0..=3, in MiB.
pub const QUALITY_TARGETS_MB: [u32; 4] = [15, 25, 45, 90];

/// Quality level meaning "match source size, no ceiling".
pub const QUALITY_MATCH_SOURCE: u8 = 4;

/// Longest still-frame intro accepted, in seconds.
pub const MAX_INTRO_SECS: f64 = 10.0;

/// Which encoder family to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HardwareStrategy {
    Nvidia,
    Amd,
    Intel,
    #[default]
    Cpu,
}

/// A sub-range of the trim window played at its own speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSegment {
    /// Source-absolute start, milliseconds.
    pub start_ms: u64,
    /// Source-absolute end, milliseconds (exclusive).
    pub end_ms: u64,
    /// Retiming factor for this range.
    pub speed: f64,
}

/// Everything the pipeline needs to produce one output video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// Source video.
    pub input_path: PathBuf,

    /// Trim window into the source, milliseconds.
    pub start_time_ms: u64,
    pub end_time_ms: u64,

    /// Source frame size as `"WxH"`.
    pub original_resolution: String,

    /// Full source duration, when the editor knows it.
    #[serde(default)]
    pub original_total_duration_ms: Option<u64>,

    /// Portrait 1080x1920 with HUD composition instead of 1920x1080.
    #[serde(default)]
    pub is_mobile_format: bool,

    /// Retiming factor for parts of the window no segment covers.
    #[serde(default = "default_speed")]
    pub speed_factor: f64,

    /// Per-range speed overrides.
    #[serde(default)]
    pub speed_segments: Vec<SpeedSegment>,

    /// 0..=3 select a target size, 4 matches the source size.
    #[serde(default = "default_quality")]
    pub quality_level: u8,

    #[serde(default)]
    pub is_boss_hp: bool,

    #[serde(default)]
    pub show_teammates_overlay: bool,

    /// HUD layout used in portrait mode.
    #[serde(default)]
    pub hud: HudCoordinates,

    #[serde(default)]
    pub bg_music_path: Option<PathBuf>,

    #[serde(default = "default_music_volume")]
    pub bg_music_volume: f64,

    /// Seeds `music_config.file_offset_s` when that is unset.
    #[serde(default)]
    pub bg_music_offset_ms: u64,

    #[serde(default)]
    pub music_config: Option<MusicConfig>,

    /// Length of the frozen-frame intro; 0 disables it.
    #[serde(default)]
    pub intro_still_sec: f64,

    /// Source-absolute time of the intro frame.
    #[serde(default)]
    pub intro_abs_time_ms: Option<u64>,

    /// Use the middle of the trim window when no explicit intro time is set.
    #[serde(default)]
    pub intro_from_midpoint: bool,

    /// Caption baked above the portrait content area.
    #[serde(default)]
    pub portrait_text: Option<String>,

    /// No fades and no padding around the trim window.
    #[serde(default)]
    pub disable_fades: bool,

    #[serde(default)]
    pub hardware_strategy: HardwareStrategy,
}

fn default_speed() -> f64 {
    1.0
}

fn default_quality() -> u8 {
    2
}

fn default_music_volume() -> f64 {
    0.8
}

/// Structural problems with a job.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("start ({start_ms} ms) must be before end ({end_ms} ms)")]
    EmptyWindow { start_ms: u64, end_ms: u64 },

    #[error("trim window of {duration_ms} ms is shorter than {MIN_CLIP_MS} ms")]
    WindowTooShort { duration_ms: u64 },

    #[error("end ({end_ms} ms) lies beyond the source duration ({total_ms} ms)")]
    EndBeyondSource { end_ms: u64, total_ms: u64 },

    #[error("speed {0} is outside [{MIN_SPEED}, {MAX_SPEED}]")]
    SpeedOutOfRange(f64),

    #[error("speed segment #{index} is malformed: {reason}")]
    MalformedSegment { index: usize, reason: String },

    #[error("quality level {0} is outside 0..=4")]
    QualityOutOfRange(u8),

    #[error("{field} {value} is outside [0, 1]")]
    VolumeOutOfRange { field: &'static str, value: f64 },

    #[error("intro length {0}s is outside [0, {MAX_INTRO_SECS}]")]
    IntroOutOfRange(f64),

    #[error(transparent)]
    Resolution(#[from] ResolutionParseError),
}

impl From<JobError> for fragcut_common::FragcutError {
    fn from(err: JobError) -> Self {
        fragcut_common::FragcutError::job_invalid(err.to_string())
    }
}

fn speed_in_range(speed: f64) -> bool {
    speed.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&speed)
}

impl ProcessingJob {
    /// Minimal landscape job over `[start_ms, end_ms)` with every option off.
    pub fn new(input_path: impl Into<PathBuf>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            input_path: input_path.into(),
            start_time_ms: start_ms,
            end_time_ms: end_ms,
            original_resolution: "1920x1080".to_string(),
            original_total_duration_ms: None,
            is_mobile_format: false,
            speed_factor: 1.0,
            speed_segments: Vec::new(),
            quality_level: default_quality(),
            is_boss_hp: false,
            show_teammates_overlay: false,
            hud: HudCoordinates::default(),
            bg_music_path: None,
            bg_music_volume: default_music_volume(),
            bg_music_offset_ms: 0,
            music_config: None,
            intro_still_sec: 0.0,
            intro_abs_time_ms: None,
            intro_from_midpoint: false,
            portrait_text: None,
            disable_fades: false,
            hardware_strategy: HardwareStrategy::Cpu,
        }
    }

    /// Check every structural invariant. File existence is not checked here.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.start_time_ms >= self.end_time_ms {
            return Err(JobError::EmptyWindow {
                start_ms: self.start_time_ms,
                end_ms: self.end_time_ms,
            });
        }
        let duration_ms = self.duration_ms();
        if duration_ms < MIN_CLIP_MS {
            return Err(JobError::WindowTooShort { duration_ms });
        }
        if let Some(total_ms) = self.original_total_duration_ms.filter(|t| *t > 0) {
            if self.end_time_ms > total_ms {
                return Err(JobError::EndBeyondSource {
                    end_ms: self.end_time_ms,
                    total_ms,
                });
            }
        }

        self.source_resolution()?;

        if !speed_in_range(self.speed_factor) {
            return Err(JobError::SpeedOutOfRange(self.speed_factor));
        }
        for (index, segment) in self.speed_segments.iter().enumerate() {
            if segment.start_ms >= segment.end_ms {
                return Err(JobError::MalformedSegment {
                    index,
                    reason: format!(
                        "start {} ms is not before end {} ms",
                        segment.start_ms, segment.end_ms
                    ),
                });
            }
            if !speed_in_range(segment.speed) {
                return Err(JobError::MalformedSegment {
                    index,
                    reason: format!("speed {} is outside [{MIN_SPEED}, {MAX_SPEED}]", segment.speed),
                });
            }
        }

        if self.quality_level > QUALITY_MATCH_SOURCE {
            return Err(JobError::QualityOutOfRange(self.quality_level));
        }

        if !(0.0..=1.0).contains(&self.bg_music_volume) {
            return Err(JobError::VolumeOutOfRange {
                field: "bg_music_volume",
                value: self.bg_music_volume,
            });
        }
        if let Some(music) = &self.music_config {
            if !(0.0..=1.0).contains(&music.video_volume) {
                return Err(JobError::VolumeOutOfRange {
                    field: "music_config.video_volume",
                    value: music.video_volume,
                });
            }
        }

        if !self.intro_still_sec.is_finite()
            || !(0.0..=MAX_INTRO_SECS).contains(&self.intro_still_sec)
        {
            return Err(JobError::IntroOutOfRange(self.intro_still_sec));
        }

        Ok(())
    }

    /// Trim window length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }

    /// Parsed `original_resolution`.
    pub fn source_resolution(&self) -> Result<Resolution, ResolutionParseError> {
        self.original_resolution.parse()
    }

    /// Final frame size.
    pub fn output_resolution(&self) -> Resolution {
        if self.is_mobile_format {
            Resolution::PORTRAIT_1080P
        } else {
            Resolution::LANDSCAPE_1080P
        }
    }

    /// Target size in MiB, or `None` for "match source".
    pub fn target_size_mb(&self) -> Option<u32> {
        QUALITY_TARGETS_MB.get(self.quality_level as usize).copied()
    }

    /// Whether the intro stage runs at all.
    pub fn has_intro(&self) -> bool {
        self.intro_still_sec > 0.0
    }

    /// Source-absolute time of the intro frame, in milliseconds.
    ///
    /// An explicit time wins; otherwise the midpoint when requested,
    /// otherwise the trim start.
    pub fn intro_time_ms(&self) -> u64 {
        match self.intro_abs_time_ms {
            Some(t) => t,
            None if self.intro_from_midpoint => {
                self.start_time_ms + self.duration_ms() / 2
            }
            None => self.start_time_ms,
        }
    }

    /// Caption text, if it has any visible content.
    pub fn caption(&self) -> Option<&str> {
        self.portrait_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    /// Merge music fields into one resolved description.
    ///
    /// `music_config` timeline bounds are authoritative; without them the
    /// music spans the whole trim window. `bg_music_offset_ms` only seeds
    /// the file offset when `music_config.file_offset_s` is unset. When the
    /// timeline starts before the trim start, the skipped part is added to
    /// the file offset. Returns `None` when there is no music or the
    /// timeline misses the trim window entirely.
    pub fn resolved_music(&self) -> Option<ResolvedMusic> {
        let path = self.bg_music_path.clone()?;
        let config = self.music_config.clone().unwrap_or_default();

        let timeline_start = config.timeline_start_ms.unwrap_or(self.start_time_ms);
        let timeline_end = config.timeline_end_ms.unwrap_or(self.end_time_ms);

        let start = timeline_start.max(self.start_time_ms);
        let end = timeline_end.min(self.end_time_ms);
        if end <= start {
            return None;
        }

        let base_offset_s = config
            .file_offset_s
            .unwrap_or(self.bg_music_offset_ms as f64 / 1000.0)
            .max(0.0);
        let skipped_s = self.start_time_ms.saturating_sub(timeline_start) as f64 / 1000.0;

        Some(ResolvedMusic {
            path,
            file_offset_s: base_offset_s + skipped_s,
            volume: self.bg_music_volume,
            video_volume: config.video_volume,
            timeline_ms: (start, end),
            duck: config.duck.sanitized(),
            enable_eq: config.enable_eq,
        })
    }
}
