//! Job orchestration: probe, plan, render core, render intro, assemble,
//! publish.
//!
//! Each submitted job runs on its own worker thread with a single-threaded
//! tokio runtime. The caller keeps an [`Arc<JobControl>`] through the
//! orchestrator's registry and can cancel at any time; the worker always
//! removes its temp directory before reporting the result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use fragcut_common::fs::{move_file, next_output_path};
use fragcut_common::{AppConfig, FragcutError, FragcutResult};
use fragcut_job_model::{ProcessingJob, ProcessingResult, ResolvedMusic, MAX_INTRO_SECS};
use fragcut_processing_core::bitrate::source_bytes_for_window;
use fragcut_processing_core::{
    plan_speed_chunks, plan_trim, plan_video_kbps, BitrateRequest, SizeTarget, TimeProjection,
    TrimPlan,
};
use serde::Serialize;
use tracing::Instrument;

use crate::control::JobControl;
use crate::encoder::{
    codec_flags, intro_codec_flags, parse_preference, Encoder, EncoderSelector,
};
use crate::events::{JobId, JobObserver, JobState};
use crate::filters::{build_core_graph, build_intro_graph, CoreGraphSpec, MusicInput};
use crate::graph::FilterGraph;
use crate::overlay::{CaptionBaker, FontCaptionBaker};
use crate::probe::{FfprobeProber, MediaProbe, VideoInfo};
use crate::progress::MonotoneProgress;
use crate::runner::{FfmpegStageRunner, StageAbort, StageRunner, WatchdogLimits};
use crate::stages::{
    assembly_args, concat_list, core_args, core_input_indices, intro_args, AssemblyArgs,
    CoreArgs, IntroArgs, Stage, StageRequest,
};
use crate::workspace::{JobPaths, TempJobDir};

/// How far past the probed duration a trim end may reach.
pub const END_TOLERANCE_SECS: f64 = 0.1;

/// Stand-in for the per-job temp directory in a [`RenderPlan`].
pub const PLAN_WORKDIR: &str = "<job-dir>";

/// Read-only settings shared by every job of an orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub file_stem: String,
    /// Parent of per-job temp directories; system temp when `None`.
    pub temp_root: Option<PathBuf>,
    pub encoder_preference: Vec<Encoder>,
    pub min_video_kbps: u32,
    pub min_audio_kbps: u32,
    pub min_free_disk_mb: u64,
}

impl PipelineConfig {
    pub fn from_app(config: &AppConfig) -> FragcutResult<Self> {
        Ok(Self {
            output_dir: config.output.directory.clone(),
            file_stem: config.output.file_stem.clone(),
            temp_root: None,
            encoder_preference: parse_preference(&config.encoding.preference)?,
            min_video_kbps: config.encoding.min_video_kbps,
            min_audio_kbps: config.encoding.min_audio_kbps,
            min_free_disk_mb: config.watchdog.min_free_disk_mb,
        })
    }
}

/// Dry-run description of a job.
///
/// No temp directory exists yet when a plan is made, so every scratch path
/// in `stages` sits under [`PLAN_WORKDIR`].
#[derive(Debug, Clone, Serialize)]
pub struct RenderPlan {
    pub source: VideoInfo,
    pub seek_secs: f64,
    pub input_secs: f64,
    /// Output length without the intro.
    pub output_secs: f64,
    pub intro_secs: f64,
    /// `None` means constant-quality mode.
    pub video_kbps: Option<u32>,
    pub audio_kbps: u32,
    pub initial_encoder: Encoder,
    pub music: Option<PathBuf>,
    pub core_filter: String,
    pub intro_filter: Option<String>,
    pub stages: Vec<StageRequest>,
}

/// Resolve a binary from an explicit path or `PATH`.
pub fn resolve_binary(explicit: Option<&Path>, name: &str) -> FragcutResult<PathBuf> {
    match explicit {
        Some(path) if path.is_file() => Ok(path.to_path_buf()),
        Some(path) => Err(FragcutError::config(format!(
            "{name} not found at {}",
            path.display()
        ))),
        None => which::which(name)
            .map_err(|e| FragcutError::config(format!("{name} not found on PATH: {e}"))),
    }
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    thread: JoinHandle<ProcessingResult>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the job reaches a terminal state.
    pub fn wait(self) -> ProcessingResult {
        self.thread.join().unwrap_or_else(|_| {
            ProcessingResult::failure(&FragcutError::internal("job worker panicked"), 0.0)
        })
    }
}

/// Runs processing jobs.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: PipelineConfig,
    ffmpeg: PathBuf,
    probe: Arc<dyn MediaProbe>,
    runner: Arc<dyn StageRunner>,
    baker: Arc<dyn CaptionBaker>,
    jobs: Mutex<HashMap<JobId, Arc<JobControl>>>,
    next_id: AtomicU64,
    /// Serializes output name selection across concurrent jobs.
    publish_lock: Mutex<()>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("ffmpeg", &self.inner.ffmpeg)
            .field("runner", &self.inner.runner.name())
            .finish()
    }
}

impl Orchestrator {
    /// Real ffmpeg/ffprobe, resolved once here.
    pub fn new(config: &AppConfig) -> FragcutResult<Self> {
        let ffmpeg = resolve_binary(config.binaries.ffmpeg.as_deref(), "ffmpeg")?;
        let ffprobe = resolve_binary(config.binaries.ffprobe.as_deref(), "ffprobe")?;
        tracing::info!(
            ffmpeg = %ffmpeg.display(),
            ffprobe = %ffprobe.display(),
            "Resolved media binaries"
        );

        let probe = FfprobeProber::new(ffprobe).with_timeout(std::time::Duration::from_secs(
            config.watchdog.probe_timeout_secs.max(1),
        ));
        let runner = FfmpegStageRunner::new(WatchdogLimits::from(&config.watchdog));
        let baker = FontCaptionBaker::from_config(&config.caption);

        Ok(Self::with_components(
            PipelineConfig::from_app(config)?,
            ffmpeg,
            Arc::new(probe),
            Arc::new(runner),
            Arc::new(baker),
        ))
    }

    /// Assemble from explicit parts.
    pub fn with_components(
        config: PipelineConfig,
        ffmpeg: PathBuf,
        probe: Arc<dyn MediaProbe>,
        runner: Arc<dyn StageRunner>,
        baker: Arc<dyn CaptionBaker>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                ffmpeg,
                probe,
                runner,
                baker,
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                publish_lock: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.inner.ffmpeg
    }

    /// Start a job on its own worker thread.
    pub fn submit(
        &self,
        job: ProcessingJob,
        observer: Arc<dyn JobObserver>,
    ) -> FragcutResult<JobHandle> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let control = Arc::new(JobControl::new());
        self.inner.registry().insert(id, Arc::clone(&control));

        let inner = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name(format!("fragcut-job-{id}"))
            .spawn(move || {
                let result = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(inner.run_job(id, job, &control, &*observer)),
                    Err(e) => {
                        let result = ProcessingResult::failure(&FragcutError::from(e), 0.0);
                        observer.on_complete(id, &result);
                        result
                    }
                };
                inner.registry().remove(&id);
                result
            });

        match spawned {
            Ok(thread) => Ok(JobHandle { id, thread }),
            Err(e) => {
                self.inner.registry().remove(&id);
                Err(e.into())
            }
        }
    }

    /// Cancel a running job. Returns false when the id is unknown or the
    /// job already finished.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let control = self.inner.registry().get(&job_id).cloned();
        match control {
            Some(control) => {
                control.cancel();
                true
            }
            None => false,
        }
    }

    /// Ids of jobs that have not finished yet.
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.inner.registry().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Run a job on the current task. The caller owns `control`.
    pub async fn run(
        &self,
        job: ProcessingJob,
        control: &JobControl,
        observer: &dyn JobObserver,
    ) -> ProcessingResult {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.run_job(id, job, control, observer).await
    }

    /// Probe and plan without running ffmpeg.
    pub async fn plan(&self, job: &ProcessingJob) -> FragcutResult<RenderPlan> {
        let inner = &self.inner;
        let planned = inner.prepare(job).await?;
        let paths = JobPaths::new(PathBuf::from(PLAN_WORKDIR));
        let encoder = EncoderSelector::new(inner.config.encoder_preference.clone(), job.hardware_strategy)
            .initial_encoder(job.hardware_strategy);

        let caption_png = paths.caption_png();
        let caption = job.caption().map(|_| caption_png.as_path());
        let core_graph = planned.core_graph(job, caption.is_some());
        let intro_graph = planned.intro_graph(job, caption.is_some());

        let mut stages = vec![planned.core_request(&inner.ffmpeg, &paths, caption, encoder)];
        if job.has_intro() {
            stages.push(planned.intro_request(&inner.ffmpeg, &paths, caption, encoder));
        }
        stages.push(planned.assembly_request(&inner.ffmpeg, &paths, stages.len(), encoder));

        Ok(RenderPlan {
            source: planned.info.clone(),
            seek_secs: planned.trim.seek_secs,
            input_secs: planned.trim.input_secs,
            output_secs: planned.output_secs,
            intro_secs: planned.intro_secs,
            video_kbps: planned.video_kbps,
            audio_kbps: planned.audio_kbps,
            initial_encoder: encoder,
            music: planned.music.as_ref().map(|m| m.path.clone()),
            core_filter: core_graph.to_script(),
            intro_filter: intro_graph.map(|g| g.to_script()),
            stages,
        })
    }
}

/// Everything computed before the first stage runs.
struct Planned {
    source_path: PathBuf,
    info: VideoInfo,
    trim: TrimPlan,
    projection: TimeProjection,
    output_secs: f64,
    intro_secs: f64,
    intro_seek_secs: f64,
    video_kbps: Option<u32>,
    audio_kbps: u32,
    music: Option<ResolvedMusic>,
    /// Playable music after the file offset; `None` when the probe could
    /// not tell.
    music_available_secs: Option<f64>,
    publish_dir: PathBuf,
}

impl Planned {
    fn core_graph(&self, job: &ProcessingJob, has_caption: bool) -> FilterGraph {
        let (caption_input, music_input) = core_input_indices(has_caption, self.music.is_some());
        build_core_graph(&CoreGraphSpec {
            job,
            source: &self.info,
            trim: self.trim,
            projection: &self.projection,
            caption_input,
            music: self
                .music
                .as_ref()
                .zip(music_input)
                .map(|(music, index)| MusicInput {
                    index,
                    music,
                    available_secs: self.music_available_secs,
                }),
        })
    }

    fn intro_graph(&self, job: &ProcessingJob, has_caption: bool) -> Option<FilterGraph> {
        job.has_intro().then(|| {
            build_intro_graph(job, &self.info, has_caption.then_some(1), self.intro_secs)
        })
    }

    fn core_request(
        &self,
        ffmpeg: &Path,
        paths: &JobPaths,
        caption: Option<&Path>,
        encoder: Encoder,
    ) -> StageRequest {
        let codec = codec_flags(encoder, self.video_kbps, &self.info.fps_expr);
        let output = paths.core_video();
        let args = core_args(&CoreArgs {
            source: &self.source_path,
            trim: &self.trim,
            caption,
            music: self.music.as_ref().map(|m| m.path.as_path()),
            filter_script: &paths.filter_script(),
            codec: &codec,
            audio_kbps: self.audio_kbps,
            output: &output,
        });
        StageRequest {
            stage: Stage::Core,
            program: ffmpeg.to_path_buf(),
            args,
            output_path: output,
            expected_secs: self.output_secs,
            encoder: Some(encoder),
            publish_dir: Some(self.publish_dir.clone()),
        }
    }

    fn intro_request(
        &self,
        ffmpeg: &Path,
        paths: &JobPaths,
        caption: Option<&Path>,
        encoder: Encoder,
    ) -> StageRequest {
        let codec = intro_codec_flags(encoder, &self.info.fps_expr);
        let output = paths.intro_video();
        let args = intro_args(&IntroArgs {
            source: &self.source_path,
            seek_secs: self.intro_seek_secs,
            duration_secs: self.intro_secs,
            caption,
            filter_script: &paths.intro_filter_script(),
            codec: &codec,
            audio_kbps: self.audio_kbps,
            output: &output,
        });
        StageRequest {
            stage: Stage::Intro,
            program: ffmpeg.to_path_buf(),
            args,
            output_path: output,
            expected_secs: self.intro_secs,
            encoder: Some(encoder),
            publish_dir: Some(self.publish_dir.clone()),
        }
    }

    fn assembly_request(
        &self,
        ffmpeg: &Path,
        paths: &JobPaths,
        input_count: usize,
        encoder: Encoder,
    ) -> StageRequest {
        let codec = codec_flags(encoder, self.video_kbps, &self.info.fps_expr);
        let output = paths.final_video();
        let assembly = AssemblyArgs {
            concat_list: &paths.concat_list(),
            input_count,
            codec: &codec,
            fps_expr: &self.info.fps_expr,
            audio_kbps: self.audio_kbps,
            output: &output,
        };
        let stream_copy = assembly.stream_copy();
        let args = assembly_args(&assembly);
        StageRequest {
            stage: Stage::Assembly,
            program: ffmpeg.to_path_buf(),
            args,
            output_path: output,
            expected_secs: self.output_secs + if stream_copy { 0.0 } else { self.intro_secs },
            encoder: (!stream_copy).then_some(encoder),
            publish_dir: Some(self.publish_dir.clone()),
        }
    }
}

/// Publishes progress and state for one job.
struct Reporter<'a> {
    id: JobId,
    observer: &'a dyn JobObserver,
    progress: MonotoneProgress,
}

impl Reporter<'_> {
    fn progress(&self, percent: u8, phase: &str) {
        if let Some(percent) = self.progress.advance(percent) {
            self.observer.on_progress(self.id, percent, phase);
        }
    }

    fn status(&self, state: JobState, message: &str) {
        tracing::info!(state = state.label(), "{message}");
        self.observer.on_status(self.id, state, message);
    }
}

/// Successful end of the stage sequence.
struct Finished {
    path: PathBuf,
    /// Encoder that wrote the published video stream.
    encoder: Encoder,
    size_bytes: u64,
}

fn ensure_not_cancelled(control: &JobControl) -> FragcutResult<()> {
    if control.is_cancelled() {
        Err(FragcutError::Cancelled)
    } else {
        Ok(())
    }
}

impl Inner {
    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Arc<JobControl>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_job(
        &self,
        id: JobId,
        job: ProcessingJob,
        control: &JobControl,
        observer: &dyn JobObserver,
    ) -> ProcessingResult {
        let span = tracing::info_span!("job", job_id = id);
        async {
            let started = Instant::now();
            let reporter = Reporter {
                id,
                observer,
                progress: MonotoneProgress::default(),
            };
            reporter.status(JobState::Created, "Job accepted");
            reporter.progress(0, "Starting");

            let outcome = self.execute(&job, control, &reporter).await;
            let elapsed = started.elapsed().as_secs_f64();

            let result = match outcome {
                Ok(done) => {
                    reporter.progress(100, "Done");
                    reporter.status(
                        JobState::Succeeded,
                        &format!("Saved {}", done.path.display()),
                    );
                    ProcessingResult::success(done.path, done.encoder.name(), elapsed, done.size_bytes)
                }
                Err(FragcutError::Cancelled) => {
                    reporter.status(JobState::Cancelled, "Cancelled");
                    ProcessingResult::failure(&FragcutError::Cancelled, elapsed)
                }
                Err(e) => {
                    tracing::error!(kind = e.kind().as_str(), error = %e, "Job failed");
                    reporter.status(JobState::Failed, &e.to_string());
                    ProcessingResult::failure(&e, elapsed)
                }
            };
            tracing::info!(
                success = result.success,
                elapsed_secs = elapsed,
                "Job finished"
            );
            observer.on_complete(id, &result);
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job: &ProcessingJob,
        control: &JobControl,
        reporter: &Reporter<'_>,
    ) -> FragcutResult<Finished> {
        reporter.status(JobState::Probing, "Probing input");
        let planned = self.prepare(job).await?;
        reporter.status(JobState::Planning, "Render planned");
        ensure_not_cancelled(control)?;

        let workdir = TempJobDir::create(self.config.temp_root.as_deref())?;
        let result = self
            .render(job, &planned, workdir.paths(), control, reporter)
            .await;
        workdir.close();
        result
    }

    /// Probing and planning. Nothing here touches the filesystem beyond
    /// reads.
    async fn prepare(&self, job: &ProcessingJob) -> FragcutResult<Planned> {
        let source_path = job.input_path.clone();
        if !source_path.exists() {
            return Err(FragcutError::InputMissing { path: source_path });
        }
        if let Err(e) = std::fs::File::open(&source_path) {
            return Err(FragcutError::input_unreadable(&source_path, e.to_string()));
        }
        job.validate()?;

        let info = self.probe.probe_video(&source_path).await?;
        let source_secs = (info.duration_secs > 0.0).then_some(info.duration_secs);
        if let Some(total) = source_secs {
            let end = job.end_time_ms as f64 / 1000.0;
            if end > total + END_TOLERANCE_SECS {
                return Err(FragcutError::job_invalid(format!(
                    "trim end {end:.3}s is beyond the source duration {total:.3}s"
                )));
            }
        }
        let audio_kbps = self
            .probe
            .probe_audio_bitrate(&source_path)
            .await
            .unwrap_or(0)
            .max(self.config.min_audio_kbps);

        let trim = plan_trim(job.start_time_ms, job.end_time_ms, source_secs, job.disable_fades);
        let projection = TimeProjection::new(
            plan_speed_chunks(
                &job.speed_segments,
                job.speed_factor,
                job.start_time_ms,
                job.duration_ms(),
            ),
            job.start_time_ms,
        );
        let output_secs = projection.output_secs();
        let intro_secs = if job.has_intro() {
            job.intro_still_sec.min(MAX_INTRO_SECS)
        } else {
            0.0
        };
        let mut intro_seek_secs = job.intro_time_ms() as f64 / 1000.0;
        if let Some(total) = source_secs {
            intro_seek_secs = intro_seek_secs.min((total - END_TOLERANCE_SECS).max(0.0));
        }

        let target = match job.target_size_mb() {
            Some(mb) => SizeTarget::Megabytes(mb),
            None => SizeTarget::MatchSource {
                source_bytes: source_bytes_for_window(
                    info.size_bytes,
                    info.duration_secs,
                    trim.clip_secs,
                ),
            },
        };
        let video_kbps = plan_video_kbps(&BitrateRequest {
            duration_secs: output_secs + intro_secs,
            audio_kbps,
            target,
            min_video_kbps: self.config.min_video_kbps,
        })?;

        let (music, music_available_secs) = match self.usable_music(job).await {
            Some((music, available)) => (Some(music), available),
            None => (None, None),
        };

        tracing::info!(
            width = info.width,
            height = info.height,
            fps = %info.fps_expr,
            output_secs,
            video_kbps = ?video_kbps,
            audio_kbps,
            music = music.is_some(),
            "Planned render"
        );

        Ok(Planned {
            source_path,
            info,
            trim,
            projection,
            output_secs,
            intro_secs,
            intro_seek_secs,
            video_kbps,
            audio_kbps,
            music,
            music_available_secs,
            publish_dir: self.config.output_dir.clone(),
        })
    }

    /// Music that can actually be played, with the seconds left after its
    /// offset when the file's length is known. Problems only drop the music.
    async fn usable_music(&self, job: &ProcessingJob) -> Option<(ResolvedMusic, Option<f64>)> {
        let music = job.resolved_music()?;
        if !music.path.is_file() {
            tracing::warn!(path = %music.path.display(), "Music file missing; continuing without music");
            return None;
        }
        let duration = self.probe.probe_audio_duration(&music.path).await;
        if duration > 0.0 && music.file_offset_s >= duration {
            tracing::warn!(
                offset_secs = music.file_offset_s,
                duration_secs = duration,
                "Music offset is past the end of the file; continuing without music"
            );
            return None;
        }
        let available = (duration > 0.0).then(|| duration - music.file_offset_s);
        Some((music, available))
    }

    async fn render(
        &self,
        job: &ProcessingJob,
        planned: &Planned,
        paths: &JobPaths,
        control: &JobControl,
        reporter: &Reporter<'_>,
    ) -> FragcutResult<Finished> {
        let caption = job.caption().and_then(|text| {
            self.baker
                .bake(text, job.output_resolution(), &paths.caption_png())
        });
        let caption = caption.as_deref();

        std::fs::write(
            paths.filter_script(),
            planned.core_graph(job, caption.is_some()).to_script(),
        )?;

        let mut selector =
            EncoderSelector::new(self.config.encoder_preference.clone(), job.hardware_strategy);
        let first = selector.initial_encoder(job.hardware_strategy);

        reporter.status(JobState::CoreRendering, "Rendering clip");
        let core_encoder = self
            .run_with_fallback(&mut selector, first, control, reporter, |encoder| {
                planned.core_request(&self.ffmpeg, paths, caption, encoder)
            })
            .await?;

        let mut segments = Vec::with_capacity(2);
        let mut final_encoder = core_encoder;
        if let Some(graph) = planned.intro_graph(job, caption.is_some()) {
            ensure_not_cancelled(control)?;
            std::fs::write(paths.intro_filter_script(), graph.to_script())?;
            reporter.status(JobState::IntroRendering, "Rendering intro");
            final_encoder = self
                .run_with_fallback(&mut selector, core_encoder, control, reporter, |encoder| {
                    planned.intro_request(&self.ffmpeg, paths, caption, encoder)
                })
                .await?;
            segments.push(paths.intro_video());
        }
        segments.push(paths.core_video());

        ensure_not_cancelled(control)?;
        let entries: Vec<&Path> = segments.iter().map(PathBuf::as_path).collect();
        std::fs::write(paths.concat_list(), concat_list(&entries))?;
        reporter.status(JobState::Assembling, "Assembling");
        if segments.len() > 1 {
            final_encoder = self
                .run_with_fallback(&mut selector, final_encoder, control, reporter, |encoder| {
                    planned.assembly_request(&self.ffmpeg, paths, segments.len(), encoder)
                })
                .await?;
        } else {
            let request = planned.assembly_request(&self.ffmpeg, paths, 1, final_encoder);
            self.run_stage(&request, control, reporter).await?;
        }

        ensure_not_cancelled(control)?;
        self.publish(&paths.final_video(), final_encoder)
    }

    fn publish(&self, rendered: &Path, encoder: Encoder) -> FragcutResult<Finished> {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::fs::create_dir_all(&self.config.output_dir)?;
        let destination = std::path::absolute(next_output_path(
            &self.config.output_dir,
            &self.config.file_stem,
        ))?;
        move_file(rendered, &destination)?;
        let size_bytes = std::fs::metadata(&destination)?.len();
        tracing::info!(path = %destination.display(), size_bytes, "Published output");
        Ok(Finished {
            path: destination,
            encoder,
            size_bytes,
        })
    }

    /// Run a stage, walking the encoder fallback chain on encoder failures.
    /// Returns the encoder that succeeded.
    async fn run_with_fallback<F>(
        &self,
        selector: &mut EncoderSelector,
        start: Encoder,
        control: &JobControl,
        reporter: &Reporter<'_>,
        build: F,
    ) -> FragcutResult<Encoder>
    where
        F: Fn(Encoder) -> StageRequest,
    {
        let mut encoder = start;
        loop {
            selector.record_attempt(encoder);
            let request = build(encoder);
            let error = match self.run_stage(&request, control, reporter).await {
                Ok(()) => return Ok(encoder),
                Err(e) if e.is_recoverable_by_fallback() => e,
                Err(e) => return Err(e),
            };

            match selector.next_after(encoder) {
                Some(next) => {
                    tracing::warn!(
                        stage = %request.stage,
                        encoder = encoder.name(),
                        next = next.name(),
                        error = %error,
                        "Encoder failed, falling back"
                    );
                    reporter.status(
                        JobState::from(request.stage),
                        &format!("{} failed, retrying with {}", encoder.name(), next.name()),
                    );
                    encoder = next;
                }
                None => {
                    return Err(FragcutError::AllEncodersFailed {
                        attempted: selector
                            .attempted()
                            .iter()
                            .map(|e| e.name().to_string())
                            .collect(),
                        last: error.to_string(),
                    });
                }
            }
        }
    }

    /// Run one ffmpeg invocation and judge the result.
    async fn run_stage(
        &self,
        request: &StageRequest,
        control: &JobControl,
        reporter: &Reporter<'_>,
    ) -> FragcutResult<()> {
        ensure_not_cancelled(control)?;
        let scaler = request.stage.scaler();
        let phase = request.stage.phase();
        reporter.progress(scaler.start(), phase);

        let on_progress = |percent: u8| reporter.progress(scaler.scale(percent), phase);
        let outcome = self.runner.run(request, control, &on_progress).await?;

        match outcome.abort {
            Some(StageAbort::Cancelled) => return Err(FragcutError::Cancelled),
            Some(StageAbort::DiskFull { free_mb }) => {
                tracing::warn!(free_mb, "Output volume is nearly full");
                return Err(FragcutError::DiskFull {
                    min_free_mb: self.config.min_free_disk_mb,
                });
            }
            Some(StageAbort::Stalled { idle_secs }) => {
                return Err(FragcutError::Stalled { idle_secs })
            }
            None => {}
        }
        ensure_not_cancelled(control)?;

        let produced = std::fs::metadata(&request.output_path)
            .map(|m| m.len())
            .unwrap_or(0);
        if outcome.exit_code == Some(0) && produced > 0 {
            reporter.progress(scaler.end(), phase);
            return Ok(());
        }

        let tail = if outcome.error_tail.is_empty() {
            "no output produced".to_string()
        } else {
            outcome.error_tail
        };
        Err(FragcutError::EncoderFailed {
            encoder: request
                .encoder
                .map_or("copy", Encoder::name)
                .to_string(),
            exit_code: outcome.exit_code,
            tail,
        })
    }
}

impl From<Stage> for JobState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Core => JobState::CoreRendering,
            Stage::Intro => JobState::IntroRendering,
            Stage::Assembly => JobState::Assembling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_binary_must_exist() {
        let err = resolve_binary(Some(Path::new("/nonexistent/ffmpeg")), "ffmpeg").unwrap_err();
        assert!(matches!(err, FragcutError::Config { .. }));
    }

    #[test]
    fn test_explicit_binary_is_used_verbatim() {
        let dir = tempfile::TempDir::new().unwrap();
        let fake = dir.path().join("ffmpeg");
        std::fs::write(&fake, b"").unwrap();
        assert_eq!(resolve_binary(Some(&fake), "ffmpeg").unwrap(), fake);
    }

    #[test]
    fn test_stage_states() {
        assert_eq!(JobState::from(Stage::Intro), JobState::IntroRendering);
        assert_eq!(JobState::from(Stage::Assembly), JobState::Assembling);
    }
}
