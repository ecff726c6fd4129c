//! Caption rasterization.
//!
//! The caption is fitted with [`fit_caption`] and drawn onto a transparent
//! full-frame PNG that the filter graph overlays at the origin.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use fragcut_common::config::CaptionConfig;
use fragcut_common::{FragcutError, FragcutResult};
use fragcut_job_model::Resolution;
use fragcut_processing_core::hud_transform::CAPTION_BAR_HEIGHT;
use fragcut_processing_core::layout::Alignment;
use fragcut_processing_core::{fit_caption, CaptionLayout, CaptionLimits, TextMeasure};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};

/// Fonts tried when no font is configured. Each covers Latin and Hebrew.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const SHADOW_OFFSET: i32 = 3;
const SHADOW: Rgba<u8> = Rgba([0, 0, 0, 160]);
const TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LINE_SPACING: f32 = 1.2;
const LANDSCAPE_TOP_PX: i32 = 40;

/// Turns caption text into an overlay image.
///
/// Failure is never fatal: implementations log and return `None`, and the
/// job continues without a caption.
pub trait CaptionBaker: Send + Sync {
    fn bake(&self, text: &str, canvas: Resolution, out: &Path) -> Option<PathBuf>;
}

/// [`CaptionBaker`] drawing with a TrueType font.
pub struct FontCaptionBaker {
    font: Option<FontVec>,
    limits: CaptionLimits,
}

impl std::fmt::Debug for FontCaptionBaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontCaptionBaker")
            .field("has_font", &self.font.is_some())
            .field("limits", &self.limits)
            .finish()
    }
}

impl FontCaptionBaker {
    /// Load the configured font, or the first system font that parses.
    pub fn from_config(config: &CaptionConfig) -> Self {
        let limits = CaptionLimits {
            base_size_px: config.base_size_px,
            min_size_px: config.min_size_px,
            wrap_threshold_px: config.wrap_threshold_px,
            hard_max_px: config.hard_max_px,
        };

        let candidates: Vec<PathBuf> = match &config.font_path {
            Some(path) => vec![path.clone()],
            None => SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
        };
        let font = candidates.iter().find_map(|path| match load_font(path) {
            Ok(font) => {
                tracing::debug!(font = %path.display(), "Loaded caption font");
                Some(font)
            }
            Err(e) => {
                if config.font_path.is_some() {
                    tracing::warn!(font = %path.display(), error = %e, "Caption font unusable");
                }
                None
            }
        });
        if font.is_none() {
            tracing::warn!("No caption font available; captions will be skipped");
        }

        Self { font, limits }
    }

    pub fn with_font_bytes(bytes: Vec<u8>, limits: CaptionLimits) -> FragcutResult<Self> {
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| FragcutError::config(format!("Invalid caption font: {e}")))?;
        Ok(Self {
            font: Some(font),
            limits,
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn render(
        &self,
        font: &FontVec,
        text: &str,
        canvas: Resolution,
        out: &Path,
    ) -> Result<PathBuf, String> {
        let measure = GlyphMeasure { font };
        let layout = fit_caption(text, &self.limits, &measure)
            .ok_or_else(|| "caption is blank".to_string())?;

        let mut image = RgbaImage::new(canvas.width, canvas.height);
        let scale = PxScale::from(layout.size_px);
        let line_height = (layout.size_px * LINE_SPACING).ceil() as i32;
        let top = block_top(canvas, line_height * layout.lines.len() as i32);
        let margin = ((canvas.width as f32 - self.limits.wrap_threshold_px) / 2.0).max(0.0) as i32;

        for (i, line) in layout.lines.iter().enumerate() {
            let width = measure.text_width(line, layout.size_px).ceil() as i32;
            let x = line_x(layout.alignment, canvas.width as i32, width, margin);
            let y = top + i as i32 * line_height;
            draw_text_mut(
                &mut image,
                SHADOW,
                x + SHADOW_OFFSET,
                y + SHADOW_OFFSET,
                scale,
                font,
                line,
            );
            draw_text_mut(&mut image, TEXT, x, y, scale, font, line);
        }

        image
            .save_with_format(out, ImageFormat::Png)
            .map_err(|e| e.to_string())?;
        log_layout(&layout, out);
        Ok(out.to_path_buf())
    }
}

impl CaptionBaker for FontCaptionBaker {
    fn bake(&self, text: &str, canvas: Resolution, out: &Path) -> Option<PathBuf> {
        let font = self.font.as_ref()?;
        match self.render(font, text, canvas, out) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "Caption rendering failed; continuing without it");
                None
            }
        }
    }
}

fn load_font(path: &Path) -> Result<FontVec, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec(bytes).map_err(|e| e.to_string())
}

fn log_layout(layout: &CaptionLayout, out: &Path) {
    tracing::debug!(
        size_px = layout.size_px,
        lines = layout.lines.len(),
        widest_px = layout.widest_px,
        alignment = ?layout.alignment,
        path = %out.display(),
        "Baked caption"
    );
}

struct GlyphMeasure<'a> {
    font: &'a FontVec,
}

impl TextMeasure for GlyphMeasure<'_> {
    fn text_width(&self, text: &str, size_px: f32) -> f32 {
        text_size(PxScale::from(size_px), self.font, text).0 as f32
    }
}

/// Top of the text block: centred in the portrait caption bar, near the
/// top edge in landscape.
fn block_top(canvas: Resolution, block_height: i32) -> i32 {
    if canvas.height > canvas.width {
        ((CAPTION_BAR_HEIGHT as i32 - block_height) / 2).max(0)
    } else {
        LANDSCAPE_TOP_PX
    }
}

fn line_x(alignment: Alignment, canvas_width: i32, line_width: i32, margin: i32) -> i32 {
    match alignment {
        Alignment::Center => ((canvas_width - line_width) / 2).max(0),
        Alignment::Left => margin,
        Alignment::Right => (canvas_width - margin - line_width).max(0),
    }
}
