//! Drawing state replayed against one chunk canvas.

use std::sync::Arc;

use kurbo::{Affine, BezPath, Ellipse, PathEl, Point, Shape, Vec2};

use crate::foundation::core::Rgba8;
use crate::foundation::error::{MimageError, MimageResult};
use crate::foundation::math::lerp_rgba8;
use crate::raster::canvas::ChunkCanvas;
use crate::raster::composite::{effective_alpha, over, weighted_premul};
use crate::raster::pattern::{Pattern, SolidPattern};

/// Stroke width used until `set_line_width` is called.
pub const DEFAULT_LINE_WIDTH: f64 = 1.0;

const ELLIPSE_TOLERANCE: f64 = 0.1;

/// Drawing context for one chunk: color, styles, line width, transform, current path and mask.
///
/// Coordinates are chunk-local. `origin` is the global position of the chunk's top-left pixel and
/// is only used to sample patterns in global space.
pub(crate) struct Painter {
    size: u16,
    origin: (i64, i64),
    color: Rgba8,
    fill: Arc<dyn Pattern>,
    stroke: Arc<dyn Pattern>,
    line_width: f64,
    transform: Affine,
    path: BezPath,
    has_current_point: bool,
    mask: Option<Vec<u8>>,
}

impl Painter {
    pub(crate) fn new(size: u16, origin: (i64, i64)) -> Self {
        let black: Arc<dyn Pattern> = Arc::new(SolidPattern(Rgba8::BLACK));
        Self {
            size,
            origin,
            color: Rgba8::BLACK,
            fill: Arc::clone(&black),
            stroke: black,
            line_width: DEFAULT_LINE_WIDTH,
            transform: Affine::IDENTITY,
            path: BezPath::new(),
            has_current_point: false,
            mask: None,
        }
    }

    pub(crate) fn set_color(&mut self, color: Rgba8) {
        let solid: Arc<dyn Pattern> = Arc::new(SolidPattern(color));
        self.color = color;
        self.fill = Arc::clone(&solid);
        self.stroke = solid;
    }

    pub(crate) fn set_fill_style(&mut self, pattern: Arc<dyn Pattern>) {
        self.fill = pattern;
    }

    pub(crate) fn set_stroke_style(&mut self, pattern: Arc<dyn Pattern>) {
        self.stroke = pattern;
    }

    pub(crate) fn set_line_width(&mut self, width: f64) {
        self.line_width = width;
    }

    /// Install a mask of `size * size` alpha values, row-major.
    pub(crate) fn set_mask(&mut self, mask: Vec<u8>) -> MimageResult<()> {
        let expected = usize::from(self.size) * usize::from(self.size);
        if mask.len() != expected {
            return Err(MimageError::internal(format!(
                "mask has {} values, chunk needs {expected}",
                mask.len()
            )));
        }
        self.mask = Some(mask);
        Ok(())
    }

    /// Flip the mask. Without a mask this installs one that shields every pixel.
    pub(crate) fn invert_mask(&mut self) {
        match &mut self.mask {
            Some(mask) => mask.iter_mut().for_each(|m| *m = 255 - *m),
            None => {
                self.mask = Some(vec![255; usize::from(self.size) * usize::from(self.size)]);
            }
        }
    }

    pub(crate) fn rotate_about(&mut self, angle: f64, center: Point) {
        self.transform *= Affine::rotate_about(angle, center);
    }

    pub(crate) fn move_to(&mut self, p: Point) {
        self.path.move_to(self.transform * p);
        self.has_current_point = true;
    }

    pub(crate) fn line_to(&mut self, p: Point) {
        if !self.has_current_point {
            self.move_to(p);
            return;
        }
        self.path.line_to(self.transform * p);
    }

    pub(crate) fn close_path(&mut self) {
        if self.has_current_point {
            self.path.close_path();
        }
    }

    pub(crate) fn draw_rectangle(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.move_to(Point::new(x, y));
        self.line_to(Point::new(x + w, y));
        self.line_to(Point::new(x + w, y + h));
        self.line_to(Point::new(x, y + h));
        self.close_path();
    }

    pub(crate) fn draw_ellipse(&mut self, center: Point, rx: f64, ry: f64) {
        let ellipse = Ellipse::new(center, Vec2::new(rx.abs(), ry.abs()), 0.0);
        let outline = self.transform * ellipse.to_path(ELLIPSE_TOLERANCE);
        self.path.extend(outline);
        self.has_current_point = true;
    }

    pub(crate) fn fill(&mut self, canvas: &mut ChunkCanvas) {
        if let Some(coverage) = self.rasterize(None) {
            let pattern = Arc::clone(&self.fill);
            self.composite_coverage(canvas, &coverage, pattern.as_ref());
        }
        self.clear_path();
    }

    pub(crate) fn stroke(&mut self, canvas: &mut ChunkCanvas) {
        if self.line_width > 0.0
            && let Some(coverage) = self.rasterize(Some(self.line_width))
        {
            let pattern = Arc::clone(&self.stroke);
            self.composite_coverage(canvas, &coverage, pattern.as_ref());
        }
        self.clear_path();
    }

    /// Replace every pixel with the current color. The mask does not apply.
    pub(crate) fn clear(&self, canvas: &mut ChunkCanvas) {
        canvas.fill_all(self.color.premultiplied());
    }

    pub(crate) fn set_pixel(&self, canvas: &mut ChunkCanvas, x: i64, y: i64) {
        let Some((lx, ly)) = self.local(x, y) else {
            return;
        };
        let color = self.color.premultiplied();
        match self.mask_at(lx, ly) {
            0 => canvas.set_pixel(lx, ly, color),
            255 => {}
            m => {
                let dst = canvas.pixel(lx, ly);
                canvas.set_pixel(lx, ly, lerp_rgba8(dst, color, 255 - m));
            }
        }
    }

    /// Composite `image` source-over with its top-left corner at chunk-local `(x, y)`.
    pub(crate) fn draw_image(&self, canvas: &mut ChunkCanvas, image: &image::RgbaImage, x: i64, y: i64) {
        let size = i64::from(self.size);
        let (w, h) = (i64::from(image.width()), i64::from(image.height()));
        let (x0, y0) = (x.max(0), y.max(0));
        let (x1, y1) = (x.saturating_add(w).min(size), y.saturating_add(h).min(size));
        for ly in y0..y1 {
            for lx in x0..x1 {
                let src = image.get_pixel((lx - x) as u32, (ly - y) as u32).0;
                let weight = effective_alpha(255, self.mask_at(lx as u32, ly as u32));
                let src = weighted_premul(src, weight);
                let dst = canvas.pixel(lx as u32, ly as u32);
                canvas.set_pixel(lx as u32, ly as u32, over(dst, src));
            }
        }
    }

    fn local(&self, x: i64, y: i64) -> Option<(u32, u32)> {
        let size = i64::from(self.size);
        ((0..size).contains(&x) && (0..size).contains(&y)).then_some((x as u32, y as u32))
    }

    fn mask_at(&self, x: u32, y: u32) -> u8 {
        self.mask
            .as_ref()
            .map(|m| m[y as usize * usize::from(self.size) + x as usize])
            .unwrap_or(0)
    }

    fn clear_path(&mut self) {
        self.path = BezPath::new();
        self.has_current_point = false;
    }

    /// Rasterize the current path into an alpha coverage pixmap.
    fn rasterize(&self, stroke_width: Option<f64>) -> Option<vello_cpu::Pixmap> {
        if self.path.elements().is_empty() {
            return None;
        }
        let path = bezpath_to_cpu(&self.path);
        let mut ctx = vello_cpu::RenderContext::new(self.size, self.size);
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(255, 255, 255, 255));
        match stroke_width {
            None => ctx.fill_path(&path),
            Some(width) => {
                ctx.set_stroke(vello_cpu::kurbo::Stroke::new(width));
                ctx.stroke_path(&path);
            }
        }
        ctx.flush();
        let mut coverage = vello_cpu::Pixmap::new(self.size, self.size);
        ctx.render_to_pixmap(&mut coverage);
        Some(coverage)
    }

    fn composite_coverage(
        &self,
        canvas: &mut ChunkCanvas,
        coverage: &vello_cpu::Pixmap,
        pattern: &dyn Pattern,
    ) {
        let side = usize::from(self.size);
        let (ox, oy) = self.origin;
        let cov = coverage.data_as_u8_slice();
        let data = canvas.data_mut();
        for (i, dst) in data.chunks_exact_mut(4).enumerate() {
            let c = cov[i * 4 + 3];
            if c == 0 {
                continue;
            }
            let m = self.mask.as_ref().map(|m| m[i]).unwrap_or(0);
            let weight = effective_alpha(c, m);
            if weight == 0 {
                continue;
            }
            let (lx, ly) = ((i % side) as i64, (i / side) as i64);
            let color = pattern.color_at(ox + lx, oy + ly);
            let src = weighted_premul([color.r, color.g, color.b, color.a], weight);
            let out = over([dst[0], dst[1], dst[2], dst[3]], src);
            dst.copy_from_slice(&out);
        }
    }
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgba8 = Rgba8::opaque(255, 0, 0);

    fn painter() -> (Painter, ChunkCanvas) {
        (Painter::new(32, (0, 0)), ChunkCanvas::blank(32))
    }

    #[test]
    fn filled_rectangle_covers_inside_only() {
        let (mut p, mut c) = painter();
        p.set_color(RED);
        p.draw_rectangle(4.0, 4.0, 8.0, 8.0);
        p.fill(&mut c);
        assert_eq!(c.color(8, 8), RED);
        assert_eq!(c.color(5, 5), RED);
        assert_eq!(c.color(2, 2), Rgba8::TRANSPARENT);
        assert_eq!(c.color(20, 20), Rgba8::TRANSPARENT);
    }

    #[test]
    fn fill_clears_the_path() {
        let (mut p, mut c) = painter();
        p.set_color(RED);
        p.draw_rectangle(0.0, 0.0, 4.0, 4.0);
        p.fill(&mut c);
        p.set_color(Rgba8::opaque(0, 255, 0));
        p.fill(&mut c);
        assert_eq!(c.color(1, 1), RED);
    }

    #[test]
    fn stroke_paints_the_outline() {
        let (mut p, mut c) = painter();
        p.set_color(RED);
        p.set_line_width(4.0);
        p.move_to(Point::new(0.0, 16.0));
        p.line_to(Point::new(32.0, 16.0));
        p.stroke(&mut c);
        assert_eq!(c.color(10, 15), RED);
        assert_eq!(c.color(10, 16), RED);
        assert_eq!(c.color(10, 5), Rgba8::TRANSPARENT);
    }

    #[test]
    fn ellipse_fill_hits_center_not_corner() {
        let (mut p, mut c) = painter();
        p.set_color(RED);
        p.draw_ellipse(Point::new(16.0, 16.0), 10.0, 6.0);
        p.fill(&mut c);
        assert_eq!(c.color(16, 16), RED);
        assert_eq!(c.color(7, 11), Rgba8::TRANSPARENT);
    }

    #[test]
    fn rotation_applies_to_later_points() {
        let (mut p, mut c) = painter();
        p.set_color(RED);
        p.rotate_about(std::f64::consts::FRAC_PI_2, Point::new(16.0, 16.0));
        // A wide flat bar becomes a tall thin one.
        p.draw_rectangle(4.0, 14.0, 24.0, 4.0);
        p.fill(&mut c);
        assert_eq!(c.color(16, 6), RED);
        assert_eq!(c.color(6, 16), Rgba8::TRANSPARENT);
    }

    #[test]
    fn full_mask_shields_fill_and_pixel() {
        let (mut p, mut c) = painter();
        let mut mask = vec![0u8; 32 * 32];
        for y in 0..16 {
            for x in 0..32 {
                mask[y * 32 + x] = 255;
            }
        }
        p.set_mask(mask).unwrap();
        p.set_color(RED);
        p.draw_rectangle(0.0, 0.0, 32.0, 32.0);
        p.fill(&mut c);
        p.set_pixel(&mut c, 3, 3);
        assert_eq!(c.color(3, 3), Rgba8::TRANSPARENT);
        assert_eq!(c.color(3, 20), RED);
    }

    #[test]
    fn invert_without_mask_shields_everything() {
        let (mut p, mut c) = painter();
        p.invert_mask();
        p.set_color(RED);
        p.set_pixel(&mut c, 1, 1);
        p.draw_rectangle(0.0, 0.0, 8.0, 8.0);
        p.fill(&mut c);
        assert_eq!(c.color(1, 1), Rgba8::TRANSPARENT);

        p.invert_mask();
        p.set_pixel(&mut c, 1, 1);
        assert_eq!(c.color(1, 1), RED);
    }

    #[test]
    fn mask_of_wrong_size_is_rejected() {
        let (mut p, _) = painter();
        assert!(p.set_mask(vec![0; 3]).is_err());
    }

    #[test]
    fn clear_ignores_mask() {
        let (mut p, mut c) = painter();
        p.invert_mask();
        p.set_color(RED);
        p.clear(&mut c);
        assert_eq!(c.color(31, 0), RED);
    }

    #[test]
    fn draw_image_is_clipped_to_the_chunk() {
        let (p, mut c) = painter();
        let img = image::RgbaImage::from_pixel(10, 10, image::Rgba([0, 0, 255, 255]));
        p.draw_image(&mut c, &img, 28, -5);
        assert_eq!(c.color(31, 0), Rgba8::opaque(0, 0, 255));
        assert_eq!(c.color(29, 4), Rgba8::opaque(0, 0, 255));
        assert_eq!(c.color(29, 5), Rgba8::TRANSPARENT);
        assert_eq!(c.color(27, 0), Rgba8::TRANSPARENT);
    }

    #[test]
    fn pattern_is_sampled_in_global_space() {
        #[derive(Debug)]
        struct Checker;
        impl Pattern for Checker {
            fn color_at(&self, x: i64, _y: i64) -> Rgba8 {
                if x >= 100 { RED } else { Rgba8::WHITE }
            }
        }
        let mut p = Painter::new(32, (90, 0));
        let mut c = ChunkCanvas::blank(32);
        p.set_fill_style(Arc::new(Checker));
        p.draw_rectangle(0.0, 0.0, 32.0, 32.0);
        p.fill(&mut c);
        assert_eq!(c.color(5, 5), Rgba8::WHITE);
        assert_eq!(c.color(15, 5), RED);
    }
}
