//! Caption fitting.
//!
//! Finds a font size and line breaks that keep a caption inside the
//! wrap threshold on at most [`MAX_LINES`] lines, shrinking the font as
//! needed. Glyph metrics come from a [`TextMeasure`] so the search can run
//! without a real font.

use crate::bidi::{paragraph_direction, visual_order, TextDirection};

/// Lines a caption may occupy before the font is shrunk further.
pub const MAX_LINES: usize = 2;

const MAX_ITERATIONS: usize = 64;

/// Pixel width of a string at a given font size.
pub trait TextMeasure {
    fn text_width(&self, text: &str, size_px: f32) -> f32;
}

/// Fitting limits, in output pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionLimits {
    pub base_size_px: f32,
    pub min_size_px: f32,
    /// Widest a wrapped line may be.
    pub wrap_threshold_px: f32,
    /// Widest a single token may be before it is broken by character.
    pub hard_max_px: f32,
}

impl Default for CaptionLimits {
    fn default() -> Self {
        Self {
            base_size_px: 80.0,
            min_size_px: 36.0,
            wrap_threshold_px: 950.0,
            hard_max_px: 900.0,
        }
    }
}

/// Horizontal placement of each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// A fitted caption, lines already in visual order.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLayout {
    pub size_px: f32,
    pub lines: Vec<String>,
    pub widest_px: f32,
    pub direction: TextDirection,
    pub alignment: Alignment,
}

/// Fit `text` into the limits.
///
/// Returns `None` for blank text. Wrapping runs on logical text; each line
/// is reordered for display afterwards so RTL words wrap in reading order.
pub fn fit_caption(
    text: &str,
    limits: &CaptionLimits,
    measure: &dyn TextMeasure,
) -> Option<CaptionLayout> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let min_size = limits.min_size_px.max(1.0);
    let mut size = limits.base_size_px.max(min_size);
    let mut lines;
    let mut widest;

    let mut iterations = 0;
    loop {
        lines = wrap_at(text, size, limits, measure);
        widest = widest_line(&lines, size, measure);

        let fits = widest <= limits.wrap_threshold_px && lines.len() <= MAX_LINES;
        iterations += 1;
        if fits || size <= min_size || iterations >= MAX_ITERATIONS {
            break;
        }

        let mut ratio = if widest > 0.0 {
            (limits.wrap_threshold_px / widest).min(0.92)
        } else {
            0.92
        };
        if lines.len() > MAX_LINES {
            ratio *= (MAX_LINES as f32 / lines.len() as f32).sqrt();
        }
        size = (size * ratio).max(min_size);
    }

    let direction = paragraph_direction(text);
    let alignment = match (lines.len(), direction) {
        (1, _) => Alignment::Center,
        (_, TextDirection::Rtl) => Alignment::Right,
        (_, TextDirection::Ltr) => Alignment::Left,
    };

    Some(CaptionLayout {
        size_px: size,
        lines: lines.iter().map(|line| visual_order(line)).collect(),
        widest_px: widest,
        direction,
        alignment,
    })
}

fn widest_line(lines: &[String], size: f32, measure: &dyn TextMeasure) -> f32 {
    lines
        .iter()
        .map(|line| measure.text_width(line, size))
        .fold(0.0, f32::max)
}

/// Greedy word wrap at `size`, breaking over-wide tokens by character.
fn wrap_at(text: &str, size: f32, limits: &CaptionLimits, measure: &dyn TextMeasure) -> Vec<String> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .flat_map(|token| break_token(token, size, limits.hard_max_px, measure))
        .collect();

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for token in tokens {
        if current.is_empty() {
            current = token;
            continue;
        }
        let candidate = format!("{current} {token}");
        if measure.text_width(&candidate, size) <= limits.wrap_threshold_px {
            current = candidate;
        } else {
            lines.push(std::mem::replace(&mut current, token));
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn break_token(token: &str, size: f32, hard_max: f32, measure: &dyn TextMeasure) -> Vec<String> {
    if measure.text_width(token, size) <= hard_max {
        return vec![token.to_string()];
    }
    let mut pieces = Vec::new();
    let mut piece = String::new();
    for c in token.chars() {
        piece.push(c);
        if piece.chars().count() > 1 && measure.text_width(&piece, size) > hard_max {
            piece.pop();
            pieces.push(std::mem::take(&mut piece));
            piece.push(c);
        }
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every character is 0.5 em wide.
    struct HalfEm;

    impl TextMeasure for HalfEm {
        fn text_width(&self, text: &str, size_px: f32) -> f32 {
            text.chars().count() as f32 * size_px * 0.5
        }
    }

    #[test]
    fn test_short_caption_keeps_base_size() {
        let layout = fit_caption("VICTORY ROYALE", &CaptionLimits::default(), &HalfEm).unwrap();
        assert_eq!(layout.size_px, 80.0);
        assert_eq!(layout.lines, vec!["VICTORY ROYALE".to_string()]);
        assert_eq!(layout.alignment, Alignment::Center);
    }

    #[test]
    fn test_long_caption_wraps_to_two_lines() {
        // 30 chars at 40 px per char is 1200 px, too wide for one line.
        let layout = fit_caption(
            "CRAZY NO SCOPE FROM THE BATTLE BUS",
            &CaptionLimits::default(),
            &HalfEm,
        )
        .unwrap();
        assert!(layout.lines.len() <= MAX_LINES);
        assert!(layout.widest_px <= 950.0);
        assert_eq!(layout.alignment, Alignment::Left);
    }

    #[test]
    fn test_very_long_caption_shrinks_to_minimum() {
        let text = "word ".repeat(200);
        let layout = fit_caption(&text, &CaptionLimits::default(), &HalfEm).unwrap();
        assert_eq!(layout.size_px, 36.0);
    }

    #[test]
    fn test_unbroken_token_is_split_by_character() {
        let token = "A".repeat(60);
        let pieces = break_token(&token, 80.0, 900.0, &HalfEm);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| HalfEm.text_width(p, 80.0) <= 900.0));
        assert_eq!(pieces.concat(), token);
    }

    #[test]
    fn test_rtl_multiline_aligns_right() {
        let text = "שלום עולם ".repeat(8);
        let layout = fit_caption(&text, &CaptionLimits::default(), &HalfEm).unwrap();
        assert_eq!(layout.direction, TextDirection::Rtl);
        if layout.lines.len() > 1 {
            assert_eq!(layout.alignment, Alignment::Right);
        }
    }

    #[test]
    fn test_blank_caption_has_no_layout() {
        assert!(fit_caption("   ", &CaptionLimits::default(), &HalfEm).is_none());
    }
}
