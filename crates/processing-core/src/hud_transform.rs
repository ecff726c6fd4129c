//! HUD element placement on the portrait canvas.
//!
//! Portrait frames are composed on a 1280x1920 backend canvas, then scaled
//! down to the 1080x1620 content area of the final frame. HUD layouts are
//! authored against that 1080-wide content area, so every placement is
//! multiplied by [`BACKEND_SCALE`].

use fragcut_job_model::{
    even_floor, HudElement, Rect, Resolution, REFERENCE_HEIGHT, REFERENCE_WIDTH,
};

pub const CANVAS_WIDTH: u32 = 1280;
pub const CANVAS_HEIGHT: u32 = 1920;

/// Final portrait content area.
pub const CONTENT_WIDTH: u32 = 1080;
pub const CONTENT_HEIGHT: u32 = 1620;

/// Height of the black caption bar above the content area.
pub const CAPTION_BAR_HEIGHT: u32 = 150;

/// Canvas pixels per content-area pixel.
pub const BACKEND_SCALE: f64 = CANVAS_WIDTH as f64 / CONTENT_WIDTH as f64;

/// Integer crop rectangle with even dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelCrop {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Where and how large one HUD element lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HudPlacement {
    /// Crop in source pixels.
    pub crop: PixelCrop,
    /// Size after scaling, in canvas pixels.
    pub width: u32,
    pub height: u32,
    /// Top-left overlay position on the canvas.
    pub x: i32,
    pub y: i32,
}

/// Map a rectangle from the 1920x1080 reference frame onto `source`.
pub fn reference_to_source(rect: Rect, source: Resolution) -> Rect {
    let sx = source.width as f64 / REFERENCE_WIDTH;
    let sy = source.height as f64 / REFERENCE_HEIGHT;
    Rect::new(rect.x * sx, rect.y * sy, rect.w * sx, rect.h * sy)
        .clamp_to(source.width as f64, source.height as f64)
}

/// Even-sized integer crop of `rect` that stays inside `source`.
pub fn pixel_crop(rect: Rect, source: Resolution) -> Option<PixelCrop> {
    if rect.is_empty() {
        return None;
    }
    let x = (rect.x.round() as u32).min(source.width.saturating_sub(2));
    let y = (rect.y.round() as u32).min(source.height.saturating_sub(2));
    let w = even_floor(rect.w).min(even_floor((source.width - x) as f64));
    let h = even_floor(rect.h).min(even_floor((source.height - y) as f64));
    Some(PixelCrop { x, y, w, h })
}

/// Place one HUD element for a source of the given resolution.
///
/// The scaled size derives from the reference-frame crop, so an element
/// looks the same whatever the source resolution is.
pub fn place_hud_element(element: &HudElement, source: Resolution) -> Option<HudPlacement> {
    if !(element.scale > 0.0) {
        return None;
    }
    let crop = pixel_crop(reference_to_source(element.crop_1080, source), source)?;
    Some(HudPlacement {
        crop,
        width: even_floor(to_canvas(element.crop_1080.w * element.scale)),
        height: even_floor(to_canvas(element.crop_1080.h * element.scale)),
        x: to_canvas(element.position.x).round() as i32,
        y: to_canvas(element.position.y).round() as i32,
    })
}

/// Content-area pixels to canvas pixels, snapped to 1e-6 so exact
/// multiples do not floor one pixel short.
fn to_canvas(v: f64) -> f64 {
    let scaled = v * CANVAS_WIDTH as f64 / CONTENT_WIDTH as f64;
    (scaled * 1e6).round() / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragcut_job_model::Point;

    fn element(crop: Rect, scale: f64, position: Point) -> HudElement {
        HudElement {
            crop_1080: crop,
            scale,
            position,
            z: 0,
        }
    }

    #[test]
    fn test_reference_frame_is_identity_at_1080p() {
        let rect = Rect::new(100.0, 200.0, 300.0, 40.0);
        assert_eq!(reference_to_source(rect, Resolution::LANDSCAPE_1080P), rect);
    }

    #[test]
    fn test_crop_scales_to_1440p() {
        let rect = reference_to_source(Rect::new(1390.0, 880.0, 500.0, 170.0), Resolution::new(2560, 1440));
        let crop = pixel_crop(rect, Resolution::new(2560, 1440)).unwrap();
        assert_eq!(crop.x, 1853);
        assert_eq!(crop.w % 2, 0);
        assert_eq!(crop.h % 2, 0);
        assert!(crop.x + crop.w <= 2560);
        assert!(crop.y + crop.h <= 1440);
    }

    #[test]
    fn test_placement_applies_backend_scale() {
        let e = element(Rect::new(0.0, 0.0, 540.0, 100.0), 1.0, Point::new(540.0, 810.0));
        let placed = place_hud_element(&e, Resolution::LANDSCAPE_1080P).unwrap();
        assert_eq!(placed.width, 640);
        assert_eq!(placed.x, 640);
        assert_eq!(placed.y, 960);
    }

    #[test]
    fn test_crop_at_frame_edge_stays_inside() {
        let crop = pixel_crop(Rect::new(1910.0, 1070.0, 50.0, 50.0), Resolution::LANDSCAPE_1080P);
        let crop = crop.unwrap();
        assert!(crop.x + crop.w <= 1920);
        assert!(crop.y + crop.h <= 1080);
        assert!(crop.w >= 2 && crop.h >= 2);
    }

    #[test]
    fn test_zero_scale_is_skipped() {
        let e = element(Rect::new(0.0, 0.0, 10.0, 10.0), 0.0, Point::default());
        assert!(place_hud_element(&e, Resolution::LANDSCAPE_1080P).is_none());
    }
}
