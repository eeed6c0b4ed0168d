use std::fmt;

use crate::foundation::math::{premultiply, unpremultiply};

/// Position of a chunk in the chunk grid.
///
/// A global pixel `(x, y)` lives in chunk `(x.div_euclid(size), y.div_euclid(size))`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ChunkKey {
    /// Chunk column.
    pub x: i64,
    /// Chunk row.
    pub y: i64,
}

impl ChunkKey {
    /// Create a key from grid indices.
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Half-open integer pixel rectangle `[min, max)` in global coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    /// Inclusive left edge.
    pub min_x: i64,
    /// Inclusive top edge.
    pub min_y: i64,
    /// Exclusive right edge.
    pub max_x: i64,
    /// Exclusive bottom edge.
    pub max_y: i64,
}

impl PixelRect {
    /// Create a rectangle from its edges. No ordering is enforced; inverted rectangles are empty.
    pub fn new(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Create a rectangle from its top-left corner and size.
    pub fn from_origin_size(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self::new(
            x,
            y,
            x.saturating_add(i64::from(width)),
            y.saturating_add(i64::from(height)),
        )
    }

    /// Width in pixels, `0` for empty rectangles.
    pub fn width(self) -> i64 {
        self.max_x.saturating_sub(self.min_x).max(0)
    }

    /// Height in pixels, `0` for empty rectangles.
    pub fn height(self) -> i64 {
        self.max_y.saturating_sub(self.min_y).max(0)
    }

    /// Return `true` when the rectangle covers no pixel.
    pub fn is_empty(self) -> bool {
        self.max_x <= self.min_x || self.max_y <= self.min_y
    }

    /// Return `true` when pixel `(x, y)` is inside `[min, max)`.
    pub fn contains(self, x: i64, y: i64) -> bool {
        self.min_x <= x && x < self.max_x && self.min_y <= y && y < self.max_y
    }

    /// Largest rectangle covered by both `self` and `other` (possibly empty).
    pub fn intersect(self, other: Self) -> Self {
        Self {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        }
    }
}

/// Straight-alpha RGBA8 color as seen by callers.
///
/// Chunk canvases store premultiplied pixels; conversion happens at the API boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Fully transparent black, the color of a blank chunk.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    /// Opaque black, the default drawing color.
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    /// Opaque white.
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    /// Create a color from straight-alpha channels.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color.
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Premultiplied `[r, g, b, a]` bytes.
    pub fn premultiplied(self) -> [u8; 4] {
        premultiply([self.r, self.g, self.b, self.a])
    }

    /// Convert premultiplied `[r, g, b, a]` bytes back to straight alpha.
    pub fn from_premultiplied(px: [u8; 4]) -> Self {
        let [r, g, b, a] = unpremultiply(px);
        Self::new(r, g, b, a)
    }
}

impl From<image::Rgba<u8>> for Rgba8 {
    fn from(px: image::Rgba<u8>) -> Self {
        let [r, g, b, a] = px.0;
        Self::new(r, g, b, a)
    }
}

impl From<Rgba8> for image::Rgba<u8> {
    fn from(c: Rgba8) -> Self {
        image::Rgba([c.r, c.g, c.b, c.a])
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
