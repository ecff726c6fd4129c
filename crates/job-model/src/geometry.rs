//! Pixel geometry types.
//!
//! Unlike normalized viewports, HUD layouts are authored in pixels against a
//! fixed reference frame (1920x1080 for source crops, 1080 wide for portrait
//! placement).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Width of the reference frame HUD crops are authored against.
pub const REFERENCE_WIDTH: f64 = 1920.0;

/// Height of the reference frame HUD crops are authored against.
pub const REFERENCE_HEIGHT: f64 = 1080.0;

/// A rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Whether the rectangle has a positive area.
    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// Clamp the rectangle so it lies within `bounds_w` x `bounds_h`.
    pub fn clamp_to(&self, bounds_w: f64, bounds_h: f64) -> Rect {
        let x = self.x.clamp(0.0, bounds_w);
        let y = self.y.clamp(0.0, bounds_h);
        Rect {
            x,
            y,
            w: self.w.min(bounds_w - x).max(0.0),
            h: self.h.min(bounds_h - y).max(0.0),
        }
    }
}

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A video frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const LANDSCAPE_1080P: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub const PORTRAIT_1080P: Resolution = Resolution {
        width: 1080,
        height: 1920,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Failure to parse a `"WxH"` resolution string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unparseable resolution '{0}', expected WxH with positive integers")]
pub struct ResolutionParseError(pub String);

impl FromStr for Resolution {
    type Err = ResolutionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ResolutionParseError(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(err)?;
        let width = w.trim().parse::<u32>().map_err(|_| err())?;
        let height = h.trim().parse::<u32>().map_err(|_| err())?;
        if width == 0 || height == 0 {
            return Err(err());
        }
        Ok(Self { width, height })
    }
}

/// Round down to the nearest even integer, never below 2.
///
/// H.264 with 4:2:0 chroma needs even frame and crop dimensions.
pub fn even_floor(v: f64) -> u32 {
    let v = v.max(2.0).floor() as u32;
    (v - v % 2).max(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(
            "2560x1440".parse::<Resolution>().unwrap(),
            Resolution::new(2560, 1440)
        );
        assert_eq!(
            " 1920 X 1080 ".parse::<Resolution>().unwrap(),
            Resolution::LANDSCAPE_1080P
        );
    }

    #[test]
    fn test_parse_resolution_rejects_garbage() {
        assert!("1920".parse::<Resolution>().is_err());
        assert!("0x1080".parse::<Resolution>().is_err());
        assert!("-1x1080".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_even_floor() {
        assert_eq!(even_floor(101.7), 100);
        assert_eq!(even_floor(100.0), 100);
        assert_eq!(even_floor(0.4), 2);
    }

    #[test]
    fn test_rect_clamp() {
        let r = Rect::new(1800.0, 1000.0, 300.0, 200.0).clamp_to(1920.0, 1080.0);
        assert_eq!(r.right(), 1920.0);
        assert_eq!(r.bottom(), 1080.0);
    }
}
