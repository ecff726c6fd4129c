//! Error types shared across Fragcut crates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level error type for Fragcut operations.
#[derive(Debug, thiserror::Error)]
pub enum FragcutError {
    #[error("Input file not found: {path}")]
    InputMissing { path: PathBuf },

    #[error("Input file is not readable: {path}: {message}")]
    InputUnreadable { path: PathBuf, message: String },

    #[error("Failed to probe input: {message}")]
    InputProbeFailed { message: String },

    #[error("Invalid job: {message}")]
    JobInvalid { message: String },

    #[error(
        "Clip of {duration_secs:.2}s is too short for a {target_mb} MB target at {audio_kbps} kbps audio"
    )]
    DurationTooShortForTargetSize {
        duration_secs: f64,
        target_mb: u32,
        audio_kbps: u32,
    },

    #[error("Free disk space below {min_free_mb} MB on output volume")]
    DiskFull { min_free_mb: u64 },

    #[error("Encoder {encoder} failed (exit code {exit_code:?}): {tail}")]
    EncoderFailed {
        encoder: String,
        exit_code: Option<i32>,
        tail: String,
    },

    #[error("All encoders failed; last error: {last}")]
    AllEncodersFailed { attempted: Vec<String>, last: String },

    #[error("ffmpeg produced no output for {idle_secs}s and was stopped")]
    Stalled { idle_secs: u64 },

    #[error("Processing cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using FragcutError.
pub type FragcutResult<T> = Result<T, FragcutError>;

/// Coarse classification of a failure, carried on results and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputMissing,
    InputUnreadable,
    InputProbeFailed,
    JobInvalid,
    DurationTooShortForTargetSize,
    DiskFull,
    EncoderFailed,
    AllEncodersFailed,
    Stalled,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InputMissing => "input missing",
            ErrorKind::InputUnreadable => "input unreadable",
            ErrorKind::InputProbeFailed => "input probe failed",
            ErrorKind::JobInvalid => "invalid job",
            ErrorKind::DurationTooShortForTargetSize => "clip too short for target size",
            ErrorKind::DiskFull => "disk full",
            ErrorKind::EncoderFailed => "encoder failed",
            ErrorKind::AllEncodersFailed => "all encoders failed",
            ErrorKind::Stalled => "encoder stalled",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl FragcutError {
    pub fn input_unreadable(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::InputUnreadable {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn probe_failed(msg: impl Into<String>) -> Self {
        Self::InputProbeFailed {
            message: msg.into(),
        }
    }

    pub fn job_invalid(msg: impl Into<String>) -> Self {
        Self::JobInvalid {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }

    /// Classification used for results and fallback decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FragcutError::InputMissing { .. } => ErrorKind::InputMissing,
            FragcutError::InputUnreadable { .. } => ErrorKind::InputUnreadable,
            FragcutError::InputProbeFailed { .. } => ErrorKind::InputProbeFailed,
            FragcutError::JobInvalid { .. } => ErrorKind::JobInvalid,
            FragcutError::DurationTooShortForTargetSize { .. } => {
                ErrorKind::DurationTooShortForTargetSize
            }
            FragcutError::DiskFull { .. } => ErrorKind::DiskFull,
            FragcutError::EncoderFailed { .. } => ErrorKind::EncoderFailed,
            FragcutError::AllEncodersFailed { .. } => ErrorKind::AllEncodersFailed,
            FragcutError::Stalled { .. } => ErrorKind::Stalled,
            FragcutError::Cancelled => ErrorKind::Cancelled,
            FragcutError::Config { .. }
            | FragcutError::Internal { .. }
            | FragcutError::Io(_)
            | FragcutError::Json(_)
            | FragcutError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Only a single encoder failing can be recovered by trying the next one.
    pub fn is_recoverable_by_fallback(&self) -> bool {
        matches!(self, FragcutError::EncoderFailed { .. })
    }
}
