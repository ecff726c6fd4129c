//! Frame compositor: landscape letterboxing, portrait HUD composition and
//! the caption overlay.
//!
//! Portrait output is built on a 1280x1920 canvas filled with the centre
//! of the gameplay frame. HUD elements are cropped out of the original
//! frame and pasted on top back-to-front, then the canvas is scaled into
//! the 1080x1620 content area below the caption bar.

use fragcut_job_model::{HudRole, ProcessingJob, Resolution};
use fragcut_processing_core::hud_transform::{
    place_hud_element, HudPlacement, CANVAS_HEIGHT, CANVAS_WIDTH, CAPTION_BAR_HEIGHT,
    CONTENT_HEIGHT, CONTENT_WIDTH,
};

use crate::graph::{Filter, FilterGraph, FilterNode};

/// Label of the transformed frame stream.
pub const FRAME_LABEL: &str = "v_frame";

/// One HUD layer as it will be composited.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudLayer {
    pub role: HudRole,
    pub placement: HudPlacement,
}

/// HUD layers for a job, back-to-front. Elements that do not map onto the
/// source are dropped.
pub fn hud_layers(job: &ProcessingJob, source: Resolution) -> Vec<HudLayer> {
    job.hud
        .layers(job.is_boss_hp, job.show_teammates_overlay)
        .into_iter()
        .filter_map(|(role, element)| {
            place_hud_element(&element, source).map(|placement| HudLayer { role, placement })
        })
        .collect()
}

/// Add the nodes turning `input` into an output-sized frame.
///
/// Returns the label of the result, always [`FRAME_LABEL`].
pub fn frame_transform(
    graph: &mut FilterGraph,
    job: &ProcessingJob,
    source: Resolution,
    input: &str,
) -> String {
    if job.is_mobile_format {
        compose_portrait(graph, &hud_layers(job, source), input);
    } else {
        letterbox_landscape(graph, input);
    }
    FRAME_LABEL.to_string()
}

fn letterbox_landscape(graph: &mut FilterGraph, input: &str) {
    let out = Resolution::LANDSCAPE_1080P;
    graph.chain(
        input,
        vec![
            Filter::new("scale")
                .value(out.width)
                .value(out.height)
                .arg("force_original_aspect_ratio", "decrease"),
            Filter::new("pad")
                .value(out.width)
                .value(out.height)
                .value("(ow-iw)/2")
                .value("(oh-ih)/2")
                .value("black"),
            Filter::new("setsar").value(1),
        ],
        FRAME_LABEL,
    );
}

fn compose_portrait(graph: &mut FilterGraph, layers: &[HudLayer], input: &str) {
    let base = if layers.is_empty() {
        input.to_string()
    } else {
        let mut outputs = vec!["v_base".to_string()];
        outputs.extend((0..layers.len()).map(|i| format!("v_hud_{i}")));
        graph.push(FilterNode::new(
            [input],
            vec![Filter::new("split").value(layers.len() + 1)],
            outputs,
        ));
        "v_base".to_string()
    };

    graph.chain(
        &base,
        vec![
            Filter::new("scale")
                .value(CANVAS_WIDTH)
                .value(CANVAS_HEIGHT)
                .arg("force_original_aspect_ratio", "increase"),
            Filter::new("crop").value(CANVAS_WIDTH).value(CANVAS_HEIGHT),
            Filter::new("setsar").value(1),
        ],
        "v_canvas_0",
    );

    for (i, layer) in layers.iter().enumerate() {
        let p = &layer.placement;
        let scaled = format!("v_hud_{i}_s");
        graph.chain(
            &format!("v_hud_{i}"),
            vec![
                Filter::new("crop")
                    .value(p.crop.w)
                    .value(p.crop.h)
                    .value(p.crop.x)
                    .value(p.crop.y),
                Filter::new("scale").value(p.width).value(p.height),
            ],
            &scaled,
        );
        graph.push(FilterNode::new(
            [format!("v_canvas_{i}"), scaled],
            vec![Filter::new("overlay").arg("x", p.x).arg("y", p.y)],
            [format!("v_canvas_{}", i + 1)],
        ));
    }

    graph.chain(
        &format!("v_canvas_{}", layers.len()),
        vec![
            Filter::new("scale").value(CONTENT_WIDTH).value(CONTENT_HEIGHT),
            Filter::new("pad")
                .value(CONTENT_WIDTH)
                .value(CONTENT_HEIGHT + CAPTION_BAR_HEIGHT)
                .value(0)
                .value(CAPTION_BAR_HEIGHT)
                .value("black"),
            Filter::new("setsar").value(1),
        ],
        FRAME_LABEL,
    );
}

/// Final video node: constant frame rate, optional caption, `output` label.
///
/// The caption PNG is a full-frame transparent image fed as input
/// `caption_input`, so it is overlaid at the origin.
pub fn finish_video(
    graph: &mut FilterGraph,
    input: &str,
    fps_expr: &str,
    caption_input: Option<usize>,
    output: &str,
) {
    match caption_input {
        Some(index) => {
            graph.chain(input, vec![Filter::new("fps").value(fps_expr)], "v_cfr");
            graph.push(FilterNode::new(
                ["v_cfr".to_string(), format!("{index}:v")],
                vec![
                    Filter::new("overlay")
                        .arg("x", 0)
                        .arg("y", 0)
                        .arg("eof_action", "repeat"),
                    Filter::new("format").value("yuv420p"),
                ],
                [output],
            ));
        }
        None => graph.chain(
            input,
            vec![
                Filter::new("fps").value(fps_expr),
                Filter::new("format").value("yuv420p"),
            ],
            output,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mobile_job() -> ProcessingJob {
        let mut job = ProcessingJob::new("/v.mp4", 0, 10_000);
        job.is_mobile_format = true;
        job.show_teammates_overlay = true;
        job
    }

    #[test]
    fn test_landscape_letterbox() {
        let mut graph = FilterGraph::new();
        let job = ProcessingJob::new("/v.mp4", 0, 10_000);
        let out = frame_transform(&mut graph, &job, Resolution::new(2560, 1080), "v_trim");
        assert_eq!(out, FRAME_LABEL);
        let scale = graph.find("scale").unwrap();
        assert_eq!(scale.get("force_original_aspect_ratio"), Some("decrease"));
        assert_eq!(graph.find("pad").unwrap().to_string(), "pad=1920:1080:(ow-iw)/2:(oh-ih)/2:black");
    }

    #[test]
    fn test_portrait_layers_in_z_order() {
        let job = mobile_job();
        let layers = hud_layers(&job, Resolution::new(2560, 1440));
        let roles: Vec<HudRole> = layers.iter().map(|l| l.role).collect();
        assert_eq!(
            roles,
            vec![
                HudRole::Loot,
                HudRole::Health,
                HudRole::Stats,
                HudRole::Team,
                HudRole::Spectating
            ]
        );

        let mut graph = FilterGraph::new();
        frame_transform(&mut graph, &job, Resolution::new(2560, 1440), "v_trim");
        finish_video(&mut graph, FRAME_LABEL, "60/1", None, "vout");
        assert_eq!(graph.count("overlay"), 5);
        assert!(graph.check(&["vout"]).is_empty(), "{:?}", graph.check(&["vout"]));
        assert_eq!(
            graph.producer(FRAME_LABEL).unwrap().chain[1].to_string(),
            "pad=1080:1920:0:150:black"
        );
    }

    #[test]
    fn test_portrait_without_hud_has_no_split() {
        let mut job = mobile_job();
        job.hud = fragcut_job_model::HudCoordinates::empty();
        let mut graph = FilterGraph::new();
        frame_transform(&mut graph, &job, Resolution::LANDSCAPE_1080P, "v_trim");
        assert_eq!(graph.count("split"), 0);
        assert_eq!(graph.find("crop").unwrap().to_string(), "crop=1280:1920");
    }

    #[test]
    fn test_caption_overlay_uses_extra_input() {
        let mut graph = FilterGraph::new();
        finish_video(&mut graph, "v_speed_out", "60/1", Some(1), "vout");
        let overlay = graph.producer("vout").unwrap();
        assert_eq!(overlay.inputs, vec!["v_cfr".to_string(), "1:v".to_string()]);
    }
}
