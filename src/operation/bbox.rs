use kurbo::{Affine, Point, Rect};

use crate::foundation::core::PixelRect;
use crate::raster::painter::DEFAULT_LINE_WIDTH;

/// Running global-space extent of everything an operation may paint.
///
/// Geometry is included after the operation's current transform, so a rotated shape grows the
/// box by its rotated footprint. The box only ever grows.
#[derive(Clone, Debug)]
pub(crate) struct BoundingBox {
    rect: Option<Rect>,
    full: bool,
    max_line_width: f64,
    transform: Affine,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            rect: None,
            full: false,
            max_line_width: DEFAULT_LINE_WIDTH,
            transform: Affine::IDENTITY,
        }
    }
}

impl BoundingBox {
    /// Include a path point given in untransformed global coordinates.
    pub(crate) fn include_point(&mut self, p: Point) {
        self.include_raw(self.transform * p);
    }

    /// Include the transformed corners of an axis-aligned rectangle.
    pub(crate) fn include_shape(&mut self, r: Rect) {
        for p in [
            Point::new(r.x0, r.y0),
            Point::new(r.x1, r.y0),
            Point::new(r.x1, r.y1),
            Point::new(r.x0, r.y1),
        ] {
            self.include_point(p);
        }
    }

    /// Include a pixel-aligned rectangle that ignores the transform.
    pub(crate) fn include_pixels(&mut self, r: PixelRect) {
        if r.is_empty() {
            return;
        }
        self.include_raw(Point::new(r.min_x as f64, r.min_y as f64));
        self.include_raw(Point::new(r.max_x as f64, r.max_y as f64));
    }

    fn include_raw(&mut self, p: Point) {
        self.rect = Some(match self.rect {
            None => Rect::from_points(p, p),
            Some(r) => r.union_pt(p),
        });
    }

    pub(crate) fn grow_line_width(&mut self, width: f64) {
        self.max_line_width = self.max_line_width.max(width);
    }

    pub(crate) fn rotate_about(&mut self, angle: f64, center: Point) {
        self.transform *= Affine::rotate_about(angle, center);
    }

    pub(crate) fn cover_all(&mut self) {
        self.full = true;
    }

    /// Pixels the operation may touch: the box padded by the widest line, rounded outwards and
    /// clipped to `bounds`.
    pub(crate) fn affected(&self, bounds: PixelRect) -> PixelRect {
        if self.full {
            return bounds;
        }
        let Some(r) = self.rect else {
            return PixelRect::new(0, 0, 0, 0);
        };
        let r = r.inflate(self.max_line_width, self.max_line_width);
        let clamp = |v: f64| v.clamp(i64::MIN as f64, i64::MAX as f64) as i64;
        PixelRect::new(
            clamp(r.x0.floor()),
            clamp(r.y0.floor()),
            clamp(r.x1.ceil()),
            clamp(r.y1.ceil()),
        )
        .intersect(bounds)
    }
}
