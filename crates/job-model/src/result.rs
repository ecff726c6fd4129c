//! The value handed back when a job reaches a terminal state.

use std::path::PathBuf;

use fragcut_common::{ErrorKind, FragcutError};
use serde::{Deserialize, Serialize};

/// Outcome of one processing job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,

    /// Absolute path of the published MP4, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Failure classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Encoder that produced the core stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder: Option<String>,

    /// Wall-clock time from submit to completion.
    pub processing_time_s: f64,

    /// Size of the published file; 0 on failure.
    pub output_size_bytes: u64,
}

impl ProcessingResult {
    pub fn success(
        output_path: PathBuf,
        encoder: impl Into<String>,
        processing_time_s: f64,
        output_size_bytes: u64,
    ) -> Self {
        Self {
            success: true,
            output_path: Some(output_path),
            error_message: None,
            error_kind: None,
            encoder: Some(encoder.into()),
            processing_time_s,
            output_size_bytes,
        }
    }

    pub fn failure(error: &FragcutError, processing_time_s: f64) -> Self {
        let kind = error.kind();
        let message = match kind {
            ErrorKind::Cancelled => kind.as_str().to_string(),
            _ => format!("{}: {}", kind.as_str(), error),
        };
        Self {
            success: false,
            output_path: None,
            error_message: Some(message),
            error_kind: Some(kind),
            encoder: None,
            processing_time_s,
            output_size_bytes: 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.error_kind == Some(ErrorKind::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_carries_kind_and_tail() {
        let err = FragcutError::AllEncodersFailed {
            attempted: vec!["h264_nvenc".into(), "libx264".into()],
            last: "Error while opening encoder".into(),
        };
        let result = ProcessingResult::failure(&err, 1.5);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::AllEncodersFailed));
        let message = result.error_message.unwrap();
        assert!(message.starts_with("all encoders failed"));
        assert!(message.contains("Error while opening encoder"));
    }

    #[test]
    fn test_cancelled_result() {
        let result = ProcessingResult::failure(&FragcutError::Cancelled, 0.2);
        assert!(result.is_cancelled());
        assert_eq!(result.output_size_bytes, 0);
        assert!(result.output_path.is_none());
    }

    #[test]
    fn test_success_serializes_without_error_fields() {
        let result = ProcessingResult::success("/out/Fortnite-Video-1.mp4".into(), "libx264", 3.0, 42);
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("error_message"));
        assert!(json.contains("\"encoder\":\"libx264\""));
    }
}
