//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External tool locations.
    pub binaries: BinaryConfig,

    /// Where finished videos are written.
    pub output: OutputConfig,

    /// Caption rasterization settings.
    pub caption: CaptionConfig,

    /// Encoder preference and bitrate floors.
    pub encoding: EncodingConfig,

    /// Stage watchdog limits.
    pub watchdog: WatchdogConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Explicit paths to `ffmpeg` / `ffprobe`. `None` means "look up on PATH".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryConfig {
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

/// Output placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory that receives numbered output files.
    pub directory: PathBuf,

    /// File name stem; files are named `<stem>-<n>.mp4`.
    pub file_stem: String,
}

/// Caption text fitting parameters, in output pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// TrueType/OpenType font used for captions. Falls back to well-known
    /// system fonts when unset.
    pub font_path: Option<PathBuf>,
    pub base_size_px: f32,
    pub min_size_px: f32,
    pub wrap_threshold_px: f32,
    pub hard_max_px: f32,
}

/// Encoder selection and bitrate floors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Encoder names in fallback order.
    pub preference: Vec<String>,
    pub min_video_kbps: u32,
    pub min_audio_kbps: u32,
}

/// Limits enforced while a stage is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub min_free_disk_mb: u64,
    pub tick_ms: u64,
    pub min_stall_secs: u64,
    pub probe_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "fragcut=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: home_dir().join("!!!_Output_Video_Files_!!!"),
            file_stem: "Fortnite-Video".to_string(),
        }
    }
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            base_size_px: 80.0,
            min_size_px: 36.0,
            wrap_threshold_px: 950.0,
            hard_max_px: 900.0,
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            preference: vec![
                "h264_nvenc".to_string(),
                "h264_amf".to_string(),
                "h264_qsv".to_string(),
                "libx264".to_string(),
            ],
            min_video_kbps: 300,
            min_audio_kbps: 192,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            min_free_disk_mb: 200,
            tick_ms: 500,
            min_stall_secs: 120,
            probe_timeout_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    base.join("fragcut").join("config.json")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"encoding":{"preference":["libx264"]}}"#).unwrap();
        assert_eq!(config.encoding.preference, vec!["libx264".to_string()]);
        assert_eq!(config.encoding.min_video_kbps, 300);
        assert_eq!(config.watchdog.tick_ms, 500);
        assert_eq!(config.output.file_stem, "Fortnite-Video");
    }
}
