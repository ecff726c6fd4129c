//! Trim window and fade padding.
//!
//! The input is always seeked to the user's start and read for exactly the
//! clip length. With fades enabled, the source material available on each
//! side of the window (up to [`FADE_SECS`]) is the padding, and the
//! fade-in/fade-out run for exactly that long inside the clip. The padding
//! itself is never decoded.

/// Nominal pre-roll and post-roll length.
pub const FADE_SECS: f64 = 1.5;

/// An end closer than this to the source end counts as "at the end".
pub const END_EPSILON_SECS: f64 = 0.05;

/// How the input is seeked and which fades the graph applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimPlan {
    /// Input seek (`-ss`), seconds.
    pub seek_secs: f64,
    /// Input read length (`-t`), seconds.
    pub input_secs: f64,
    /// Padding before the user's start, and so the fade-in length.
    pub pre_roll_secs: f64,
    /// Padding after the user's end, and so the fade-out length.
    pub post_roll_secs: f64,
    /// Length of the user's window.
    pub clip_secs: f64,
}

impl TrimPlan {
    /// Fade-in duration, or `None` when there is no pre-roll.
    pub fn fade_in_secs(&self) -> Option<f64> {
        (self.pre_roll_secs > 0.0).then_some(self.pre_roll_secs)
    }

    /// `(start, duration)` of the fade-out on the clip timeline, or `None`
    /// when there is no post-roll.
    pub fn fade_out(&self) -> Option<(f64, f64)> {
        (self.post_roll_secs > 0.0)
            .then(|| (self.clip_secs - self.post_roll_secs, self.post_roll_secs))
    }
}

/// Plan the input seek and fade padding for `[start_ms, end_ms)`.
///
/// `source_secs` is the probed source length; without it no post-roll is
/// added. Padding never exceeds half the clip, so the two fades cannot
/// overlap.
pub fn plan_trim(
    start_ms: u64,
    end_ms: u64,
    source_secs: Option<f64>,
    disable_fades: bool,
) -> TrimPlan {
    let start = start_ms as f64 / 1000.0;
    let clip = end_ms.saturating_sub(start_ms) as f64 / 1000.0;

    if disable_fades {
        return TrimPlan {
            seek_secs: start,
            input_secs: clip,
            pre_roll_secs: 0.0,
            post_roll_secs: 0.0,
            clip_secs: clip,
        };
    }

    let nominal = FADE_SECS.min(clip / 2.0);
    let pre = nominal.min(start);
    let post = match source_secs.filter(|s| s.is_finite() && *s > 0.0) {
        Some(total) => {
            let remaining = total - end_ms as f64 / 1000.0;
            if remaining <= END_EPSILON_SECS {
                0.0
            } else {
                nominal.min(remaining)
            }
        }
        None => 0.0,
    };

    TrimPlan {
        seek_secs: start,
        input_secs: clip,
        pre_roll_secs: pre,
        post_roll_secs: post,
        clip_secs: clip,
    }
}

/// Format seconds the way ffmpeg time arguments are written here.
pub fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_fades_use_raw_window() {
        let plan = plan_trim(5_000, 15_000, Some(30.0), true);
        assert_eq!(format_secs(plan.seek_secs), "5.000");
        assert_eq!(format_secs(plan.input_secs), "10.000");
        assert_eq!(plan.fade_in_secs(), None);
        assert_eq!(plan.fade_out(), None);
    }

    #[test]
    fn test_symmetric_padding_in_the_middle() {
        let plan = plan_trim(5_000, 15_000, Some(30.0), false);
        assert_eq!(plan.pre_roll_secs, 1.5);
        assert_eq!(plan.post_roll_secs, 1.5);
        assert_eq!(plan.seek_secs, 5.0);
        assert_eq!(plan.input_secs, 10.0);
        assert_eq!(plan.fade_out(), Some((8.5, 1.5)));
    }

    #[test]
    fn test_start_of_source_clamps_pre_roll() {
        let plan = plan_trim(400, 10_000, Some(30.0), false);
        assert!((plan.pre_roll_secs - 0.4).abs() < 1e-9);
        assert_eq!(plan.seek_secs, 0.4);
        assert_eq!(plan.fade_in_secs(), Some(plan.pre_roll_secs));
    }

    #[test]
    fn test_end_of_source_suppresses_post_roll() {
        let plan = plan_trim(5_000, 29_980, Some(30.0), false);
        assert_eq!(plan.post_roll_secs, 0.0);
        assert_eq!(plan.fade_out(), None);
    }

    #[test]
    fn test_short_clip_caps_padding() {
        let plan = plan_trim(5_000, 6_000, Some(30.0), false);
        assert_eq!(plan.pre_roll_secs, 0.5);
        assert_eq!(plan.post_roll_secs, 0.5);
    }
}
