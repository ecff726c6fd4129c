//! Fragcut Processing Core: The Planners
//!
//! Turns a processing job into the numbers the filter graph is built from:
//! - **Bitrate:** Video kbps that makes the output fit its size target
//! - **Trim:** Input seek and symmetric fade padding
//! - **Speed:** Speed chunks, time projection, and the `atempo` ladder
//! - **Layout:** Bidi reordering and caption font-size fitting
//! - **HUD:** Reference-frame crops mapped onto the portrait canvas
//!
//! This crate is pure computation with no I/O and no process spawning.
//! All inputs are data; all outputs are data.

pub mod bidi;
pub mod bitrate;
pub mod hud_transform;
pub mod layout;
pub mod speed;
pub mod trim;

pub use bitrate::{plan_video_kbps, BitrateRequest, SizeTarget};
pub use layout::{fit_caption, CaptionLayout, CaptionLimits, TextMeasure};
pub use speed::{atempo_ladder, plan_speed_chunks, SpeedChunk, TimeProjection};
pub use trim::{plan_trim, TrimPlan};
