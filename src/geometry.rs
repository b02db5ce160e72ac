//! Page geometry: placement rects, padding and overlap tests.

use crate::error::{Result, SignError};
use serde::{Deserialize, Serialize};

/// Margin added around every rect before intersection tests.
pub const STAMP_PADDING: f64 = 5.0;

/// Width of a visible stamp.
pub const STAMP_WIDTH: f64 = 180.0;

/// Height of a visible stamp.
pub const STAMP_HEIGHT: f64 = 50.0;

/// Offset from the requested anchor to the stamp's bottom-left corner.
///
/// The anchor is the stamp's top-left corner in bottom-left-origin page space.
pub const STAMP_OFFSET: (f64, f64) = (0.0, -STAMP_HEIGHT);

/// An axis-aligned region on a page. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub page: u32,
}

/// A client-supplied stamp position, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

impl Anchor {
    pub fn new(page: u32, x: f64, y: f64) -> Self {
        Self { page, x, y }
    }

    /// Normalize into the canonical stamp box.
    pub fn to_stamp_rect(&self) -> Result<Rect> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(SignError::InvalidPlacement(
                "anchor coordinates must be finite".to_string(),
            ));
        }
        Ok(Rect {
            x: self.x + STAMP_OFFSET.0,
            y: self.y + STAMP_OFFSET.1,
            width: STAMP_WIDTH,
            height: STAMP_HEIGHT,
            page: self.page,
        })
    }
}

impl Rect {
    pub fn new(page: u32, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            page,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    /// Grow the rect by `margin` on every side.
    pub fn padded(&self, margin: f64) -> Rect {
        Rect {
            x: self.x - margin,
            y: self.y - margin,
            width: self.width + 2.0 * margin,
            height: self.height + 2.0 * margin,
            page: self.page,
        }
    }

    /// Strict intersection of the raw boxes, ignoring page. Touching edges do
    /// not intersect.
    pub fn intersects_box(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.top()
            && other.y < self.top()
    }

    /// Two stamps overlap iff they share a page and their padded boxes
    /// intersect.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.page == other.page
            && self
                .padded(STAMP_PADDING)
                .intersects_box(&other.padded(STAMP_PADDING))
    }

    /// Whether the rect has finite geometry and non-negative size.
    pub fn is_well_formed(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// Whether the rect lies entirely inside a `width` x `height` page.
    pub fn fits_within(&self, width: f64, height: f64) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= width && self.top() <= height
    }
}
