//! Core and intro filter graphs.
//!
//! The core graph reads the trimmed source (input 0), optionally a caption
//! PNG and a music file, and produces `[vout]` and `[acore]`. Labels used
//! inside the graph are stable so tests can assert on them.

use fragcut_job_model::{ProcessingJob, ResolvedMusic};
use fragcut_processing_core::{atempo_ladder, TimeProjection, TrimPlan};

use crate::compositor::{finish_video, frame_transform};
use crate::graph::{num, secs, Filter, FilterGraph, FilterNode};
use crate::probe::VideoInfo;

pub const VIDEO_OUT: &str = "vout";
pub const AUDIO_OUT: &str = "acore";
pub const INTRO_AUDIO_OUT: &str = "aout";

/// Output sample rate for every audio leg.
pub const SAMPLE_RATE: u32 = 48_000;

/// Length of the music fades, seconds.
pub const MUSIC_FADE_SECS: f64 = 1.0;

/// A music file mapped as an extra input.
#[derive(Debug, Clone, Copy)]
pub struct MusicInput<'a> {
    pub index: usize,
    pub music: &'a ResolvedMusic,
    /// Seconds of audio left in the file after `file_offset_s`, when known.
    pub available_secs: Option<f64>,
}

/// Everything the core graph depends on.
#[derive(Debug, Clone, Copy)]
pub struct CoreGraphSpec<'a> {
    pub job: &'a ProcessingJob,
    pub source: &'a VideoInfo,
    pub trim: TrimPlan,
    pub projection: &'a TimeProjection,
    pub caption_input: Option<usize>,
    pub music: Option<MusicInput<'a>>,
}

/// Build the Stage 1 graph.
pub fn build_core_graph(spec: &CoreGraphSpec<'_>) -> FilterGraph {
    let mut graph = FilterGraph::new();

    graph.chain("0:v", trim_video(&spec.trim), "v_trim");
    let frame = frame_transform(&mut graph, spec.job, spec.source.resolution(), "v_trim");
    let retimed = retime_video(&mut graph, spec.projection, &frame);
    finish_video(
        &mut graph,
        &retimed,
        &spec.source.fps_expr,
        spec.caption_input,
        VIDEO_OUT,
    );

    prepare_main_audio(&mut graph, spec);
    match spec.music {
        Some(music) => mix_music(&mut graph, spec, music),
        None => graph.chain("a_main_prepared", vec![Filter::new("anull")], AUDIO_OUT),
    }

    graph
}

/// Build the Stage 2 graph: one frame of input 0 held for `duration_secs`
/// with silent audio.
pub fn build_intro_graph(
    job: &ProcessingJob,
    source: &VideoInfo,
    caption_input: Option<usize>,
    duration_secs: f64,
) -> FilterGraph {
    let mut graph = FilterGraph::new();
    graph.chain(
        "0:v",
        vec![
            Filter::new("trim").arg("end_frame", 1),
            Filter::new("setpts").value("PTS-STARTPTS"),
            Filter::new("loop")
                .arg("loop", -1)
                .arg("size", 1)
                .arg("start", 0),
            Filter::new("fps").value(&source.fps_expr),
            Filter::new("trim").arg("duration", secs(duration_secs)),
            Filter::new("setpts").value("PTS-STARTPTS"),
        ],
        "v_still",
    );
    let frame = frame_transform(&mut graph, job, source.resolution(), "v_still");
    finish_video(&mut graph, &frame, &source.fps_expr, caption_input, VIDEO_OUT);
    graph.push(FilterNode::new(
        Vec::<String>::new(),
        silence(duration_secs),
        [INTRO_AUDIO_OUT],
    ));
    graph
}

fn silence(duration_secs: f64) -> Vec<Filter> {
    vec![
        Filter::new("anullsrc")
            .arg("r", SAMPLE_RATE)
            .arg("cl", "stereo"),
        Filter::new("atrim").arg("duration", secs(duration_secs)),
    ]
}

/// Rebase the seeked input and fade it in and out over the padding lengths.
pub fn trim_video(trim: &TrimPlan) -> Vec<Filter> {
    let mut chain = vec![Filter::new("setpts").value("PTS-STARTPTS")];
    if let Some(d) = trim.fade_in_secs() {
        chain.push(
            Filter::new("fade")
                .arg("t", "in")
                .arg("st", 0)
                .arg("d", secs(d)),
        );
    }
    if let Some((st, d)) = trim.fade_out() {
        chain.push(
            Filter::new("fade")
                .arg("t", "out")
                .arg("st", secs(st))
                .arg("d", secs(d)),
        );
    }
    chain
}

/// Audio counterpart of [`trim_video`].
pub fn trim_audio(trim: &TrimPlan) -> Vec<Filter> {
    let mut chain = vec![Filter::new("asetpts").value("PTS-STARTPTS")];
    if let Some(d) = trim.fade_in_secs() {
        chain.push(
            Filter::new("afade")
                .arg("t", "in")
                .arg("st", 0)
                .arg("d", secs(d)),
        );
    }
    if let Some((st, d)) = trim.fade_out() {
        chain.push(
            Filter::new("afade")
                .arg("t", "out")
                .arg("st", secs(st))
                .arg("d", secs(d)),
        );
    }
    chain
}

fn atempo_chain(speed: f64) -> Vec<Filter> {
    atempo_ladder(speed)
        .into_iter()
        .map(|factor| Filter::new("atempo").value(num(factor)))
        .collect()
}

fn setpts_for(speed: f64) -> Filter {
    Filter::new("setpts").value(format!("(PTS-STARTPTS)/{}", num(speed)))
}

/// Apply the projection's speed table to a video stream. Returns the label
/// carrying the retimed stream, which is `input` itself at 1x.
pub fn retime_video(graph: &mut FilterGraph, projection: &TimeProjection, input: &str) -> String {
    if projection.is_identity() {
        return input.to_string();
    }
    if let Some(speed) = projection.uniform_speed() {
        graph.chain(input, vec![setpts_for(speed)], "v_speed_out");
        return "v_speed_out".to_string();
    }

    let chunks = projection.chunks();
    graph.push(FilterNode::new(
        [input],
        vec![Filter::new("split").value(chunks.len())],
        (0..chunks.len()).map(|i| format!("v_split_{i}")),
    ));
    for (i, chunk) in chunks.iter().enumerate() {
        graph.chain(
            &format!("v_split_{i}"),
            vec![
                Filter::new("trim")
                    .arg("start", secs(chunk.start_secs))
                    .arg("end", secs(chunk.end_secs)),
                setpts_for(chunk.speed),
            ],
            &format!("v_chunk_{i}"),
        );
    }
    graph.push(FilterNode::new(
        (0..chunks.len()).map(|i| format!("v_chunk_{i}")),
        vec![Filter::new("concat")
            .arg("n", chunks.len())
            .arg("v", 1)
            .arg("a", 0)],
        ["v_speed_out"],
    ));
    "v_speed_out".to_string()
}

/// Audio counterpart of [`retime_video`], using `atempo` ladders.
pub fn retime_audio(graph: &mut FilterGraph, projection: &TimeProjection, input: &str) -> String {
    if projection.is_identity() {
        return input.to_string();
    }
    if let Some(speed) = projection.uniform_speed() {
        graph.chain(input, atempo_chain(speed), "a_speed_out");
        return "a_speed_out".to_string();
    }

    let chunks = projection.chunks();
    graph.push(FilterNode::new(
        [input],
        vec![Filter::new("asplit").value(chunks.len())],
        (0..chunks.len()).map(|i| format!("a_split_{i}")),
    ));
    for (i, chunk) in chunks.iter().enumerate() {
        let mut chain = vec![
            Filter::new("atrim")
                .arg("start", secs(chunk.start_secs))
                .arg("end", secs(chunk.end_secs)),
            Filter::new("asetpts").value("PTS-STARTPTS"),
        ];
        chain.extend(atempo_chain(chunk.speed));
        chain.push(
            Filter::new("aresample")
                .value(SAMPLE_RATE)
                .arg("async", 1)
                .arg("min_comp", "0.001"),
        );
        graph.chain(&format!("a_split_{i}"), chain, &format!("a_chunk_{i}"));
    }
    graph.push(FilterNode::new(
        (0..chunks.len()).map(|i| format!("a_chunk_{i}")),
        vec![Filter::new("concat")
            .arg("n", chunks.len())
            .arg("v", 0)
            .arg("a", 1)],
        ["a_speed_out"],
    ));
    "a_speed_out".to_string()
}

fn prepare_main_audio(graph: &mut FilterGraph, spec: &CoreGraphSpec<'_>) {
    if !spec.source.has_audio {
        graph.push(FilterNode::new(
            Vec::<String>::new(),
            silence(spec.projection.output_secs()),
            ["a_main_prepared"],
        ));
        return;
    }
    graph.chain("0:a", trim_audio(&spec.trim), "a_trim");
    let retimed = retime_audio(graph, spec.projection, "a_trim");
    graph.chain(
        &retimed,
        vec![Filter::new("aresample").value(SAMPLE_RATE)],
        "a_main_prepared",
    );
}

/// Output-domain placement of the music leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicWindow {
    /// Where the music starts on the output timeline, seconds.
    pub out_start_secs: f64,
    /// How long it plays on the output timeline, seconds. Never longer
    /// than the audio the file has left.
    pub out_secs: f64,
}

impl MusicWindow {
    pub fn new(music: &ResolvedMusic, projection: &TimeProjection, available_secs: Option<f64>) -> Self {
        let (start_ms, end_ms) = music.timeline_ms;
        let out_start_secs = projection.project_source_ms(start_ms);
        let out_end_secs = projection.project_source_ms(end_ms);
        let mut out_secs = (out_end_secs - out_start_secs).max(0.0);
        if let Some(available) = available_secs.filter(|secs| secs.is_finite()) {
            out_secs = out_secs.min(available.max(0.0));
        }
        Self {
            out_start_secs,
            out_secs,
        }
    }

    pub fn delay_ms(&self) -> u64 {
        (self.out_start_secs * 1000.0).round() as u64
    }
}

fn mix_music(graph: &mut FilterGraph, spec: &CoreGraphSpec<'_>, input: MusicInput<'_>) {
    let music = input.music;
    let window = MusicWindow::new(music, spec.projection, input.available_secs);

    let mut leg = vec![
        Filter::new("atrim")
            .arg("start", secs(music.file_offset_s))
            .arg("duration", secs(window.out_secs)),
        Filter::new("asetpts").value("PTS-STARTPTS"),
        Filter::new("aresample").value(SAMPLE_RATE),
    ];
    if music.enable_eq {
        leg.push(Filter::new("highpass").arg("f", 60));
        leg.push(
            Filter::new("equalizer")
                .arg("f", 2500)
                .arg("t", "q")
                .arg("w", 1.2)
                .arg("g", -4),
        );
    }
    leg.push(Filter::new("volume").value(num(music.volume)));
    if !spec.job.disable_fades && window.out_secs >= 2.0 * MUSIC_FADE_SECS {
        leg.push(
            Filter::new("afade")
                .arg("t", "in")
                .arg("st", 0)
                .arg("d", secs(MUSIC_FADE_SECS)),
        );
        leg.push(
            Filter::new("afade")
                .arg("t", "out")
                .arg("st", secs(window.out_secs - MUSIC_FADE_SECS))
                .arg("d", secs(MUSIC_FADE_SECS)),
        );
    }
    let delay = window.delay_ms();
    if delay > 0 {
        leg.push(Filter::new("adelay").value(format!("{delay}|{delay}")));
    }
    graph.chain(&format!("{}:a", input.index), leg, "a_music");

    let duck = music.duck.sanitized();
    graph.push(FilterNode::new(
        ["a_main_prepared"],
        vec![
            Filter::new("volume").value(num(music.video_volume)),
            Filter::new("asplit").value(2),
        ],
        ["a_sc", "a_mix"],
    ));
    graph.push(FilterNode::new(
        ["a_music", "a_sc"],
        vec![Filter::new("sidechaincompress")
            .arg("threshold", num(duck.threshold))
            .arg("ratio", num(duck.ratio))
            .arg("attack", 5)
            .arg("release", 50)],
        ["a_ducked"],
    ));
    graph.push(FilterNode::new(
        ["a_mix", "a_ducked"],
        vec![
            Filter::new("amix")
                .arg("inputs", 2)
                .arg("duration", "first")
                .arg("dropout_transition", 0)
                .arg("normalize", 0),
            Filter::new("alimiter").arg("limit", 0.98),
        ],
        [AUDIO_OUT],
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragcut_job_model::{DuckParams, SpeedSegment};
    use fragcut_processing_core::{plan_speed_chunks, plan_trim};

    fn source() -> VideoInfo {
        VideoInfo {
            duration_secs: 30.0,
            width: 1920,
            height: 1080,
            fps_expr: "60/1".to_string(),
            has_audio: true,
            audio_sample_rate: Some(48_000),
            size_bytes: 0,
        }
    }

    fn projection(job: &ProcessingJob) -> TimeProjection {
        TimeProjection::new(
            plan_speed_chunks(
                &job.speed_segments,
                job.speed_factor,
                job.start_time_ms,
                job.duration_ms(),
            ),
            job.start_time_ms,
        )
    }

    fn music(timeline_ms: (u64, u64)) -> ResolvedMusic {
        ResolvedMusic {
            path: "/m.mp3".into(),
            file_offset_s: 10.0,
            volume: 0.8,
            video_volume: 1.0,
            timeline_ms,
            duck: DuckParams::default(),
            enable_eq: false,
        }
    }

    #[test]
    fn test_straight_trim_graph() {
        let job = ProcessingJob::new("/v.mp4", 5000, 15000);
        let src = source();
        let proj = projection(&job);
        let graph = build_core_graph(&CoreGraphSpec {
            job: &job,
            source: &src,
            trim: plan_trim(5000, 15000, Some(30.0), false),
            projection: &proj,
            caption_input: None,
            music: None,
        });

        assert!(graph.check(&[VIDEO_OUT, AUDIO_OUT]).is_empty());
        assert_eq!(graph.count("trim"), 0);
        assert_eq!(graph.count("atrim"), 0);
        let fade_out = graph
            .filters()
            .find(|f| f.name == "fade" && f.get("t") == Some("out"))
            .unwrap();
        assert_eq!(fade_out.to_string(), "fade=t=out:st=8.500:d=1.500");
        assert_eq!(graph.count("fade"), 2);
        assert_eq!(graph.count("afade"), 2);
        assert_eq!(graph.count("setpts"), 1);
        assert!(graph.producer(AUDIO_OUT).unwrap().has_filter("anull"));
    }

    #[test]
    fn test_fades_disabled_has_no_trim_or_fade() {
        let mut job = ProcessingJob::new("/v.mp4", 5000, 15000);
        job.disable_fades = true;
        let src = source();
        let proj = projection(&job);
        let graph = build_core_graph(&CoreGraphSpec {
            job: &job,
            source: &src,
            trim: plan_trim(5000, 15000, Some(30.0), true),
            projection: &proj,
            caption_input: None,
            music: None,
        });
        assert_eq!(graph.count("trim"), 0);
        assert_eq!(graph.count("fade"), 0);
        assert_eq!(graph.count("afade"), 0);
    }

    #[test]
    fn test_uniform_speed_uses_setpts_and_atempo() {
        let mut job = ProcessingJob::new("/v.mp4", 0, 10_000);
        job.speed_factor = 1.5;
        let src = source();
        let proj = projection(&job);
        let graph = build_core_graph(&CoreGraphSpec {
            job: &job,
            source: &src,
            trim: plan_trim(0, 10_000, Some(30.0), true),
            projection: &proj,
            caption_input: None,
            music: None,
        });
        assert_eq!(graph.count("split"), 0);
        assert!(graph
            .filters()
            .any(|f| f.to_string() == "setpts=(PTS-STARTPTS)/1.5"));
        assert_eq!(graph.find("atempo").unwrap().to_string(), "atempo=1.5");
    }

    #[test]
    fn test_variable_speed_with_music_ducking() {
        let mut job = ProcessingJob::new("/v.mp4", 0, 30_000);
        job.speed_segments = vec![
            SpeedSegment {
                start_ms: 0,
                end_ms: 10_000,
                speed: 0.5,
            },
            SpeedSegment {
                start_ms: 20_000,
                end_ms: 30_000,
                speed: 2.0,
            },
        ];
        let src = source();
        let proj = projection(&job);
        assert!((proj.output_secs() - 35.0).abs() < 1e-3);

        let music = music((0, 30_000));
        let graph = build_core_graph(&CoreGraphSpec {
            job: &job,
            source: &src,
            trim: plan_trim(0, 30_000, Some(30.0), false),
            projection: &proj,
            caption_input: None,
            music: Some(MusicInput {
                index: 1,
                music: &music,
                available_secs: Some(50.0),
            }),
        });

        assert!(graph.check(&[VIDEO_OUT, AUDIO_OUT]).is_empty(), "{:?}", graph.check(&[VIDEO_OUT, AUDIO_OUT]));
        let concat = graph.producer("v_speed_out").unwrap();
        assert_eq!(concat.inputs.len(), 3);
        assert_eq!(graph.count("sidechaincompress"), 1);

        let leg = graph.producer("a_music").unwrap();
        assert_eq!(leg.inputs, vec!["1:a".to_string()]);
        assert_eq!(leg.chain[0].to_string(), "atrim=start=10.000:duration=35.000");
        assert!(!leg.has_filter("adelay"));
        let fades: Vec<String> = leg
            .chain
            .iter()
            .filter(|f| f.name == "afade")
            .map(ToString::to_string)
            .collect();
        assert_eq!(fades, vec!["afade=t=in:st=0:d=1.000", "afade=t=out:st=34.000:d=1.000"]);

        let mix = graph.producer(AUDIO_OUT).unwrap();
        assert_eq!(
            mix.to_string(),
            "[a_mix][a_ducked]amix=inputs=2:duration=first:dropout_transition=0:normalize=0,alimiter=limit=0.98[acore]"
        );
    }

    #[test]
    fn test_music_after_cut_start_is_delayed() {
        let job = ProcessingJob::new("/v.mp4", 0, 20_000);
        let src = source();
        let proj = projection(&job);
        let mut music = music((4_000, 20_000));
        music.enable_eq = true;
        let graph = build_core_graph(&CoreGraphSpec {
            job: &job,
            source: &src,
            trim: plan_trim(0, 20_000, Some(30.0), true),
            projection: &proj,
            caption_input: Some(1),
            music: Some(MusicInput {
                index: 2,
                music: &music,
                available_secs: None,
            }),
        });
        let leg = graph.producer("a_music").unwrap();
        assert_eq!(leg.chain.last().unwrap().to_string(), "adelay=4000|4000");
        assert!(leg.has_filter("highpass"));
        assert!(graph.check(&[VIDEO_OUT, AUDIO_OUT]).is_empty());
    }

    #[test]
    fn test_silent_source_synthesizes_audio() {
        let mut job = ProcessingJob::new("/v.mp4", 0, 10_000);
        job.speed_factor = 2.0;
        let mut src = source();
        src.has_audio = false;
        let proj = projection(&job);
        let graph = build_core_graph(&CoreGraphSpec {
            job: &job,
            source: &src,
            trim: plan_trim(0, 10_000, Some(30.0), true),
            projection: &proj,
            caption_input: None,
            music: None,
        });
        let silent = graph.producer("a_main_prepared").unwrap();
        assert!(silent.inputs.is_empty());
        assert_eq!(silent.chain[1].to_string(), "atrim=duration=5.000");
        assert!(graph.nodes().iter().all(|n| !n.inputs.iter().any(|i| i == "0:a")));
    }

    #[test]
    fn test_short_music_ends_with_its_own_fade() {
        let job = ProcessingJob::new("/v.mp4", 0, 30_000);
        let src = source();
        let proj = projection(&job);
        let music = music((0, 30_000));
        let graph = build_core_graph(&CoreGraphSpec {
            job: &job,
            source: &src,
            trim: plan_trim(0, 30_000, Some(30.0), false),
            projection: &proj,
            caption_input: None,
            music: Some(MusicInput {
                index: 1,
                music: &music,
                available_secs: Some(5.0),
            }),
        });

        let leg = graph.producer("a_music").unwrap();
        assert_eq!(leg.chain[0].to_string(), "atrim=start=10.000:duration=5.000");
        let fade_out = leg
            .chain
            .iter()
            .find(|f| f.name == "afade" && f.get("t") == Some("out"))
            .unwrap();
        assert_eq!(fade_out.get("st"), Some("4.000"));
    }

    #[test]
    fn test_music_too_short_for_fades() {
        let job = ProcessingJob::new("/v.mp4", 0, 30_000);
        let proj = projection(&job);
        let window = MusicWindow::new(&music((0, 30_000)), &proj, Some(1.5));
        assert!((window.out_secs - 1.5).abs() < 1e-9);

        let src = source();
        let music = music((0, 30_000));
        let graph = build_core_graph(&CoreGraphSpec {
            job: &job,
            source: &src,
            trim: plan_trim(0, 30_000, Some(30.0), false),
            projection: &proj,
            caption_input: None,
            music: Some(MusicInput {
                index: 1,
                music: &music,
                available_secs: Some(1.5),
            }),
        });
        assert!(!graph.producer("a_music").unwrap().has_filter("afade"));
    }

    #[test]
    fn test_intro_graph_holds_one_frame() {
        let job = ProcessingJob::new("/v.mp4", 5000, 15000);
        let graph = build_intro_graph(&job, &source(), None, 1.0);
        assert!(graph.check(&[VIDEO_OUT, INTRO_AUDIO_OUT]).is_empty());
        assert_eq!(graph.find("loop").unwrap().to_string(), "loop=loop=-1:size=1:start=0");
        assert_eq!(
            graph.producer(INTRO_AUDIO_OUT).unwrap().to_string(),
            "anullsrc=r=48000:cl=stereo,atrim=duration=1.000[aout]"
        );
    }
}
