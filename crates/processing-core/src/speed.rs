//! Variable-speed planning.
//!
//! Speed segments are source-absolute. They are clipped to the trim window,
//! painted over a base-speed timeline (later segments win where they
//! overlap), and turned into contiguous chunks relative to the cut start.
//! The same chunk table defines the time projection from source time to
//! output time.

use fragcut_job_model::SpeedSegment;

/// Lowest factor a single `atempo` filter accepts.
pub const ATEMPO_MIN: f64 = 0.5;

/// Highest factor a single `atempo` filter accepts.
pub const ATEMPO_MAX: f64 = 2.0;

/// A contiguous piece of the clip played at one speed.
///
/// Times are seconds relative to the cut start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedChunk {
    pub start_secs: f64,
    pub end_secs: f64,
    pub speed: f64,
}

impl SpeedChunk {
    pub fn source_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }

    pub fn output_secs(&self) -> f64 {
        self.source_secs() / self.speed
    }
}

#[derive(Debug, Clone, Copy)]
struct MsSpan {
    start: u64,
    end: u64,
    speed: f64,
}

/// Split `[0, duration_ms)` into chunks with one speed each.
///
/// Segments are sorted by start (stable, so equal starts keep their input
/// order) and painted in that order; a later segment overwrites whatever
/// it overlaps. Gaps get `base_speed`. Empty chunks are dropped and
/// neighbours with the same speed are merged.
pub fn plan_speed_chunks(
    segments: &[SpeedSegment],
    base_speed: f64,
    cut_start_ms: u64,
    duration_ms: u64,
) -> Vec<SpeedChunk> {
    let cut_end_ms = cut_start_ms + duration_ms;

    let mut sorted: Vec<&SpeedSegment> = segments.iter().collect();
    sorted.sort_by_key(|s| s.start_ms);

    let mut painted: Vec<MsSpan> = Vec::new();
    for segment in sorted {
        let start = segment.start_ms.clamp(cut_start_ms, cut_end_ms) - cut_start_ms;
        let end = segment.end_ms.clamp(cut_start_ms, cut_end_ms) - cut_start_ms;
        if end <= start {
            continue;
        }
        paint(&mut painted, MsSpan {
            start,
            end,
            speed: segment.speed,
        });
    }

    let mut spans: Vec<MsSpan> = Vec::with_capacity(painted.len() * 2 + 1);
    let mut cursor = 0;
    for span in painted {
        if span.start > cursor {
            spans.push(MsSpan {
                start: cursor,
                end: span.start,
                speed: base_speed,
            });
        }
        spans.push(span);
        cursor = span.end;
    }
    if cursor < duration_ms {
        spans.push(MsSpan {
            start: cursor,
            end: duration_ms,
            speed: base_speed,
        });
    }

    let mut merged: Vec<MsSpan> = Vec::with_capacity(spans.len());
    for span in spans.into_iter().filter(|s| s.end > s.start) {
        match merged.last_mut() {
            Some(last) if last.end == span.start && last.speed == span.speed => {
                last.end = span.end;
            }
            _ => merged.push(span),
        }
    }

    merged
        .into_iter()
        .map(|s| SpeedChunk {
            start_secs: s.start as f64 / 1000.0,
            end_secs: s.end as f64 / 1000.0,
            speed: s.speed,
        })
        .collect()
}

/// Paint `span` over the sorted, non-overlapping `painted` list.
///
/// Inputs arrive sorted by start, so only the tail can overlap.
fn paint(painted: &mut Vec<MsSpan>, span: MsSpan) {
    let mut remainder = None;
    while let Some(last) = painted.last_mut() {
        if last.end <= span.start {
            break;
        }
        if last.end > span.end && remainder.is_none() {
            remainder = Some(MsSpan {
                start: span.end,
                end: last.end,
                speed: last.speed,
            });
        }
        if last.start >= span.start {
            painted.pop();
        } else {
            last.end = span.start;
            break;
        }
    }
    painted.push(span);
    if let Some(rest) = remainder {
        painted.push(rest);
    }
}

/// Maps clip-relative source time to output time.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeProjection {
    chunks: Vec<SpeedChunk>,
    cut_start_ms: u64,
}

impl TimeProjection {
    pub fn new(chunks: Vec<SpeedChunk>, cut_start_ms: u64) -> Self {
        Self {
            chunks,
            cut_start_ms,
        }
    }

    /// Projection for a clip played at one speed throughout.
    pub fn uniform(cut_start_ms: u64, duration_ms: u64, speed: f64) -> Self {
        Self::new(
            plan_speed_chunks(&[], speed, cut_start_ms, duration_ms),
            cut_start_ms,
        )
    }

    pub fn chunks(&self) -> &[SpeedChunk] {
        &self.chunks
    }

    /// Whether every chunk plays at exactly 1x.
    pub fn is_identity(&self) -> bool {
        self.chunks.iter().all(|c| c.speed == 1.0)
    }

    /// Single speed shared by all chunks, if there is one.
    pub fn uniform_speed(&self) -> Option<f64> {
        match self.chunks.as_slice() {
            [only] => Some(only.speed),
            _ => None,
        }
    }

    /// Output seconds for clip-relative source seconds `t`.
    ///
    /// Clamped to the clip; monotone non-decreasing.
    pub fn project(&self, t: f64) -> f64 {
        let mut out = 0.0;
        for chunk in &self.chunks {
            if t >= chunk.end_secs {
                out += chunk.output_secs();
            } else {
                if t > chunk.start_secs {
                    out += (t - chunk.start_secs) / chunk.speed;
                }
                break;
            }
        }
        out
    }

    /// Output seconds for a source-absolute time in milliseconds.
    pub fn project_source_ms(&self, src_ms: u64) -> f64 {
        let relative = src_ms.saturating_sub(self.cut_start_ms) as f64 / 1000.0;
        self.project(relative)
    }

    /// Total output length in seconds.
    pub fn output_secs(&self) -> f64 {
        self.chunks.iter().map(SpeedChunk::output_secs).sum()
    }
}

/// Factor `speed` into `atempo` steps that each stay in `[0.5, 2.0]`.
///
/// Whole steps of 2.0 (or 0.5) come first, followed by one fractional
/// step. Returns `[1.0]` for unit speed.
pub fn atempo_ladder(speed: f64) -> Vec<f64> {
    if !(speed.is_finite() && speed > 0.0) {
        return vec![1.0];
    }
    let mut factors = Vec::new();
    let mut rest = speed;
    while rest > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        rest /= ATEMPO_MAX;
    }
    while rest < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        rest /= ATEMPO_MIN;
    }
    factors.push(rest);
    factors
}
