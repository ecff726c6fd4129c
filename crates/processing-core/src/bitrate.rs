//! Video bitrate planning for size-bounded output.
//!
//! Sizes use binary megabytes and kilobits of 1024 bits throughout, so a
//! 45 MB target is `45 * 8 * 1024 * 1024` bits.

use fragcut_common::{FragcutError, FragcutResult};

/// Floor applied to every planned video bitrate.
pub const DEFAULT_MIN_VIDEO_KBPS: u32 = 300;

/// What the output size should be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeTarget {
    /// Fit into this many MB.
    Megabytes(u32),
    /// Match the source's size for the selected window. `None` when the
    /// source size is unknown, which selects constant-quality mode.
    MatchSource { source_bytes: Option<u64> },
}

/// Inputs to [`plan_video_kbps`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitrateRequest {
    /// Output duration in seconds, already speed-adjusted.
    pub duration_secs: f64,
    pub audio_kbps: u32,
    pub target: SizeTarget,
    pub min_video_kbps: u32,
}

/// Pick the video bitrate that makes the output fit its target.
///
/// Returns `Ok(None)` when the encoder should run in constant-quality mode
/// instead. Never returns a zero bitrate.
pub fn plan_video_kbps(req: &BitrateRequest) -> FragcutResult<Option<u32>> {
    if !(req.duration_secs.is_finite() && req.duration_secs > 0.0) {
        return Err(FragcutError::internal(format!(
            "bitrate planning needs a positive duration, got {}",
            req.duration_secs
        )));
    }
    let floor = req.min_video_kbps.max(1);

    let (target_bits, keep_highest_res) = match req.target {
        SizeTarget::Megabytes(mb) => (mb as f64 * 8.0 * 1024.0 * 1024.0, false),
        SizeTarget::MatchSource {
            source_bytes: Some(bytes),
        } => (bytes as f64 * 8.0, true),
        SizeTarget::MatchSource { source_bytes: None } => return Ok(None),
    };

    let audio_bits = req.audio_kbps as f64 * 1024.0 * req.duration_secs;
    let video_bits = target_bits - audio_bits;

    if video_bits <= 0.0 {
        if keep_highest_res {
            return Ok(Some(floor));
        }
        let target_mb = match req.target {
            SizeTarget::Megabytes(mb) => mb,
            SizeTarget::MatchSource { .. } => 0,
        };
        return Err(FragcutError::DurationTooShortForTargetSize {
            duration_secs: req.duration_secs,
            target_mb,
            audio_kbps: req.audio_kbps,
        });
    }

    let kbps = (video_bits / (1024.0 * req.duration_secs)).floor();
    let kbps = if kbps >= u32::MAX as f64 {
        u32::MAX
    } else {
        kbps as u32
    };
    Ok(Some(kbps.max(floor)))
}

/// Bytes of the source that cover `window_secs` of a `total_secs` file.
///
/// Used to derive a match-source target from the whole file's size.
pub fn source_bytes_for_window(file_bytes: u64, total_secs: f64, window_secs: f64) -> Option<u64> {
    if file_bytes == 0 || !(total_secs > 0.0) || !(window_secs > 0.0) {
        return None;
    }
    let fraction = (window_secs / total_secs).min(1.0);
    Some((file_bytes as f64 * fraction).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(duration_secs: f64, target: SizeTarget) -> BitrateRequest {
        BitrateRequest {
            duration_secs,
            audio_kbps: 192,
            target,
            min_video_kbps: DEFAULT_MIN_VIDEO_KBPS,
        }
    }

    #[test]
    fn test_ten_seconds_into_45_mb() {
        let kbps = plan_video_kbps(&request(10.0, SizeTarget::Megabytes(45)))
            .unwrap()
            .unwrap();
        // 45 MiB over 10 s is 36864 kbit/s total, minus 192 for audio.
        assert_eq!(kbps, 36_672);
    }

    #[test]
    fn test_long_clip_hits_floor() {
        let kbps = plan_video_kbps(&request(3_000.0, SizeTarget::Megabytes(15)))
            .unwrap()
            .unwrap();
        assert_eq!(kbps, DEFAULT_MIN_VIDEO_KBPS);
    }

    #[test]
    fn test_audio_alone_exceeds_target() {
        let err = plan_video_kbps(&request(1_000.0, SizeTarget::Megabytes(15))).unwrap_err();
        assert!(matches!(
            err,
            FragcutError::DurationTooShortForTargetSize { target_mb: 15, .. }
        ));
    }

    #[test]
    fn test_match_source_unknown_size_is_constant_quality() {
        assert_eq!(
            plan_video_kbps(&request(10.0, SizeTarget::MatchSource { source_bytes: None })).unwrap(),
            None
        );
    }

    #[test]
    fn test_match_source_never_fails() {
        let kbps = plan_video_kbps(&request(
            100.0,
            SizeTarget::MatchSource {
                source_bytes: Some(1_000),
            },
        ))
        .unwrap();
        assert_eq!(kbps, Some(DEFAULT_MIN_VIDEO_KBPS));
    }

    #[test]
    fn test_window_fraction() {
        assert_eq!(source_bytes_for_window(3_000, 30.0, 10.0), Some(1_000));
        assert_eq!(source_bytes_for_window(3_000, 30.0, 60.0), Some(3_000));
        assert_eq!(source_bytes_for_window(0, 30.0, 10.0), None);
    }
}
