//! Fragcut Render Engine
//!
//! Turns a [`ProcessingJob`](fragcut_job_model::ProcessingJob) into a
//! published MP4 by driving ffmpeg through three stages.
//!
//! # Pipeline Architecture
//!
//! ```text
//! input.mp4 ── ffprobe ──┐
//!                        ├── Plan (trim, speed, bitrate, music)
//! job ───────────────────┘         │
//!                                  ├── Caption PNG (optional)
//!                                  │
//!                                  ├── Stage 1: Core render ──── core.mp4
//!                                  │     trim → frame/HUD → retime → caption
//!                                  │     audio → retime → music duck/mix
//!                                  │
//!                                  ├── Stage 2: Intro still ──── intro.mp4
//!                                  │
//!                                  └── Stage 3: Assembly ─────── final.mp4
//!                                              │
//!                                              ▼
//!                                   <output_dir>/<stem>-<n>.mp4
//! ```
//!
//! Every stage runs under a watchdog (cancellation, free disk space,
//! stall) and walks the encoder fallback chain when an encoder fails.

pub mod compositor;
pub mod control;
pub mod encoder;
pub mod events;
pub mod filters;
pub mod graph;
pub mod overlay;
pub mod pipeline;
pub mod probe;
pub mod process;
pub mod progress;
pub mod runner;
pub mod stages;
pub mod workspace;

pub use control::JobControl;
pub use encoder::{list_h264_encoders, Encoder, EncoderSelector};
pub use events::{ChannelObserver, JobEvent, JobId, JobObserver, JobState, NullObserver};
pub use graph::FilterGraph;
pub use overlay::{CaptionBaker, FontCaptionBaker};
pub use pipeline::{
    resolve_binary, JobHandle, Orchestrator, PipelineConfig, RenderPlan, PLAN_WORKDIR,
};
pub use probe::{FfprobeProber, MediaProbe, VideoInfo};
pub use runner::{FfmpegStageRunner, StageAbort, StageOutcome, StageRunner, WatchdogLimits};
pub use stages::{Stage, StageRequest};
