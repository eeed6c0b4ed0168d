//! Paint sources for fills and strokes.
//!
//! Patterns are sampled at global pixel coordinates, so a gradient continues across chunk seams.

use crate::foundation::core::Rgba8;
use crate::foundation::math::lerp_rgba8;

/// Something that yields a color for every global pixel.
pub trait Pattern: Send + Sync + std::fmt::Debug {
    /// Straight-alpha color at global pixel `(x, y)`.
    fn color_at(&self, x: i64, y: i64) -> Rgba8;
}

/// A single color everywhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolidPattern(pub Rgba8);

impl Pattern for SolidPattern {
    fn color_at(&self, _x: i64, _y: i64) -> Rgba8 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ColorStop {
    offset: f64,
    color: Rgba8,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Stops(Vec<ColorStop>);

impl Stops {
    fn add(&mut self, offset: f64, color: Rgba8) {
        let offset = if offset.is_finite() {
            offset.clamp(0.0, 1.0)
        } else {
            0.0
        };
        // Stable insert keeps stops with equal offsets in insertion order.
        let at = self.0.partition_point(|s| s.offset <= offset);
        self.0.insert(at, ColorStop { offset, color });
    }

    fn sample(&self, t: f64) -> Rgba8 {
        let (Some(first), Some(last)) = (self.0.first(), self.0.last()) else {
            return Rgba8::TRANSPARENT;
        };
        if t.is_nan() || t <= first.offset {
            return first.color;
        }
        if t >= last.offset {
            return last.color;
        }
        for pair in self.0.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.offset {
                let span = b.offset - a.offset;
                if span <= f64::EPSILON {
                    return b.color;
                }
                let k = ((t - a.offset) / span * 255.0).round().clamp(0.0, 255.0) as u8;
                let c = lerp_rgba8(
                    [a.color.r, a.color.g, a.color.b, a.color.a],
                    [b.color.r, b.color.g, b.color.b, b.color.a],
                    k,
                );
                return Rgba8::new(c[0], c[1], c[2], c[3]);
            }
        }
        last.color
    }
}

/// Color varies along the line from `(x0, y0)` to `(x1, y1)`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearGradient {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    stops: Stops,
}

impl LinearGradient {
    /// Gradient axis in global coordinates.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0,
            y0,
            x1,
            y1,
            stops: Stops::default(),
        }
    }

    /// Add a color at `offset` in `[0, 1]` along the axis.
    pub fn add_color_stop(&mut self, offset: f64, color: Rgba8) -> &mut Self {
        self.stops.add(offset, color);
        self
    }
}

impl Pattern for LinearGradient {
    fn color_at(&self, x: i64, y: i64) -> Rgba8 {
        let (dx, dy) = (self.x1 - self.x0, self.y1 - self.y0);
        let len2 = dx * dx + dy * dy;
        if len2 <= f64::EPSILON {
            return self.stops.sample(0.0);
        }
        let (px, py) = (x as f64 + 0.5 - self.x0, y as f64 + 0.5 - self.y0);
        self.stops.sample((px * dx + py * dy) / len2)
    }
}

/// Color varies with distance from a center point.
#[derive(Clone, Debug, PartialEq)]
pub struct RadialGradient {
    cx: f64,
    cy: f64,
    radius: f64,
    stops: Stops,
}

impl RadialGradient {
    /// Circle in global coordinates; offset `1.0` is reached at `radius`.
    pub fn new(cx: f64, cy: f64, radius: f64) -> Self {
        Self {
            cx,
            cy,
            radius,
            stops: Stops::default(),
        }
    }

    /// Add a color at `offset` in `[0, 1]` from the center outwards.
    pub fn add_color_stop(&mut self, offset: f64, color: Rgba8) -> &mut Self {
        self.stops.add(offset, color);
        self
    }
}

impl Pattern for RadialGradient {
    fn color_at(&self, x: i64, y: i64) -> Rgba8 {
        if self.radius <= f64::EPSILON {
            return self.stops.sample(1.0);
        }
        let (px, py) = (x as f64 + 0.5 - self.cx, y as f64 + 0.5 - self.cy);
        self.stops.sample((px * px + py * py).sqrt() / self.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba8 = Rgba8::opaque(255, 0, 0);
    const BLUE: Rgba8 = Rgba8::opaque(0, 0, 255);

    #[test]
    fn gradient_without_stops_is_transparent() {
        assert_eq!(
            LinearGradient::new(0.0, 0.0, 10.0, 0.0).color_at(3, 0),
            Rgba8::TRANSPARENT
        );
    }

    #[test]
    fn linear_gradient_clamps_and_interpolates() {
        let mut g = LinearGradient::new(0.0, 0.0, 100.0, 0.0);
        g.add_color_stop(0.0, RED).add_color_stop(1.0, BLUE);
        assert_eq!(g.color_at(-50, 0), RED);
        assert_eq!(g.color_at(500, 7), BLUE);
        let mid = g.color_at(49, 0);
        assert!(mid.r > 100 && mid.r < 155, "{mid:?}");
        assert!(mid.b > 100 && mid.b < 155, "{mid:?}");
    }

    #[test]
    fn linear_gradient_is_continuous_across_chunk_seams() {
        let mut g = LinearGradient::new(0.0, 0.0, 1000.0, 0.0);
        g.add_color_stop(0.0, RED).add_color_stop(1.0, BLUE);
        let left = g.color_at(499, 0);
        let right = g.color_at(500, 0);
        assert!((i16::from(left.r) - i16::from(right.r)).abs() <= 1);
    }

    #[test]
    fn radial_gradient_center_and_edge() {
        let mut g = RadialGradient::new(50.0, 50.0, 10.0);
        g.add_color_stop(0.0, RED).add_color_stop(1.0, BLUE);
        let near = g.color_at(49, 49);
        assert!(near.r > 200 && near.b < 50, "{near:?}");
        assert_eq!(g.color_at(80, 50), BLUE);
    }
}
