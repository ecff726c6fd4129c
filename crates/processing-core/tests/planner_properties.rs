use fragcut_job_model::SpeedSegment;
use fragcut_processing_core::speed::{atempo_ladder, plan_speed_chunks, TimeProjection, ATEMPO_MAX, ATEMPO_MIN};
use fragcut_processing_core::trim::{format_secs, plan_trim, FADE_SECS};
use proptest::prelude::*;

fn segment_strategy(window_ms: u64) -> impl Strategy<Value = SpeedSegment> {
    (0..window_ms + 2_000, 0u64..20_000, 0.25f64..=4.0).prop_map(|(start, len, speed)| {
        SpeedSegment {
            start_ms: start,
            end_ms: start + len,
            speed,
        }
    })
}

proptest! {
    #[test]
    fn chunks_tile_the_window_without_gaps(
        segments in prop::collection::vec(segment_strategy(60_000), 0..8),
        base in 0.25f64..=4.0,
        cut_start in 0u64..10_000,
        duration in 500u64..60_000,
    ) {
        let chunks = plan_speed_chunks(&segments, base, cut_start, duration);
        prop_assert!(!chunks.is_empty());
        prop_assert_eq!(chunks[0].start_secs, 0.0);
        prop_assert!((chunks[chunks.len() - 1].end_secs - duration as f64 / 1000.0).abs() < 1e-9);
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].end_secs, pair[1].start_secs);
        }
        for chunk in &chunks {
            prop_assert!(chunk.end_secs > chunk.start_secs);
            prop_assert!((0.25..=4.0).contains(&chunk.speed));
        }
    }

    #[test]
    fn projection_matches_chunk_algebra_and_is_monotone(
        segments in prop::collection::vec(segment_strategy(30_000), 0..6),
        base in 0.25f64..=4.0,
        duration in 500u64..30_000,
        probes in prop::collection::vec(0u64..32_000, 2..20),
    ) {
        let chunks = plan_speed_chunks(&segments, base, 0, duration);
        let algebraic: f64 = chunks.iter().map(|c| (c.end_secs - c.start_secs) / c.speed).sum();
        let projection = TimeProjection::new(chunks, 0);

        prop_assert!((projection.output_secs() - algebraic).abs() < 0.001);
        prop_assert!((projection.project_source_ms(duration) - algebraic).abs() < 0.001);

        let mut sorted = probes.clone();
        sorted.sort_unstable();
        let mut previous = 0.0;
        for t in sorted {
            let out = projection.project_source_ms(t);
            prop_assert!(out >= previous - 1e-12);
            previous = out;
        }
    }

    #[test]
    fn atempo_ladder_multiplies_to_speed(speed in 0.25f64..=4.0) {
        let ladder = atempo_ladder(speed);
        let product: f64 = ladder.iter().product();
        prop_assert!((product - speed).abs() < 1e-3);
        for factor in ladder {
            prop_assert!((ATEMPO_MIN..=ATEMPO_MAX).contains(&factor));
        }
    }

    #[test]
    fn disabled_fades_seek_to_exact_start(
        start in 0u64..3_600_000,
        len in 500u64..600_000,
    ) {
        let plan = plan_trim(start, start + len, Some((start + len) as f64 / 1000.0 + 5.0), true);
        prop_assert_eq!(format_secs(plan.seek_secs), format!("{:.3}", start as f64 / 1000.0));
        prop_assert!((plan.input_secs - len as f64 / 1000.0).abs() < 1e-9);
        prop_assert!(plan.seek_secs >= 0.0);
    }

    #[test]
    fn fade_padding_is_symmetric_unless_clamped(
        start in 0u64..60_000,
        len in 500u64..60_000,
        tail in 0u64..60_000,
    ) {
        let end = start + len;
        let total = (end + tail) as f64 / 1000.0;
        let plan = plan_trim(start, end, Some(total), false);

        let nominal = FADE_SECS.min(len as f64 / 2000.0);
        let pre_clamped = (start as f64 / 1000.0) < nominal;
        let post_clamped = (tail as f64 / 1000.0) < nominal + 1e-6;
        if !pre_clamped && !post_clamped {
            prop_assert!((plan.pre_roll_secs - plan.post_roll_secs).abs() < 1e-9);
        }
        prop_assert!(plan.pre_roll_secs <= FADE_SECS && plan.post_roll_secs <= FADE_SECS);
        prop_assert_eq!(format_secs(plan.seek_secs), format!("{:.3}", start as f64 / 1000.0));
        prop_assert!((plan.input_secs - len as f64 / 1000.0).abs() < 1e-9);
        prop_assert!(plan.seek_secs + plan.input_secs <= total + 1e-9);

        prop_assert_eq!(plan.fade_in_secs().unwrap_or(0.0), plan.pre_roll_secs);
        let (_, fade_out) = plan.fade_out().unwrap_or((0.0, 0.0));
        prop_assert_eq!(fade_out, plan.post_roll_secs);
    }
}
