use std::sync::Arc;

use kurbo::{Point, Vec2};

use crate::chunk::context::ChunkLease;
use crate::foundation::core::{PixelRect, Rgba8};
use crate::foundation::error::MimageResult;
use crate::handle::Mimage;
use crate::raster::painter::Painter;
use crate::raster::pattern::Pattern;

/// One deferred drawing call. Coordinates are global.
#[derive(Clone, Debug)]
pub(crate) enum Action<'a> {
    SetFillStyle(Arc<dyn Pattern>),
    SetStrokeStyle(Arc<dyn Pattern>),
    SetLineWidth(f64),
    SetColor(Rgba8),
    SetMask(&'a Mimage),
    InvertMask,
    SetPixel { x: i64, y: i64 },
    MoveTo(Point),
    LineTo(Point),
    ClosePath,
    DrawRectangle { x: f64, y: f64, w: f64, h: f64 },
    RotateAbout { angle: f64, center: Point },
    DrawEllipse { center: Point, rx: f64, ry: f64 },
    Fill,
    Stroke,
    Clear,
    DrawImage { image: Arc<image::RgbaImage>, x: i64, y: i64 },
}

impl Action<'_> {
    /// Whether replaying the action counts as a change to the chunk.
    pub(crate) fn mutates(&self) -> bool {
        matches!(
            self,
            Action::SetPixel { .. }
                | Action::MoveTo(_)
                | Action::LineTo(_)
                | Action::ClosePath
                | Action::DrawRectangle { .. }
                | Action::DrawEllipse { .. }
                | Action::Fill
                | Action::Stroke
                | Action::Clear
                | Action::DrawImage { .. }
        )
    }

    /// Apply to the chunk covering `region`, translating into chunk-local coordinates.
    /// Pixel actions whose local coordinates do not fit in `i64` cannot touch the chunk and are
    /// skipped.
    ///
    /// The canvas is locked per action, never across a mask read, so a mask may come from the
    /// image being drawn.
    pub(crate) fn replay(
        &self,
        painter: &mut Painter,
        lease: &ChunkLease<'_>,
        region: PixelRect,
    ) -> MimageResult<()> {
        let (ox, oy) = (region.min_x, region.min_y);
        let shift = Vec2::new(ox as f64, oy as f64);
        match self {
            Action::SetFillStyle(p) => painter.set_fill_style(Arc::clone(p)),
            Action::SetStrokeStyle(p) => painter.set_stroke_style(Arc::clone(p)),
            Action::SetLineWidth(w) => painter.set_line_width(*w),
            Action::SetColor(c) => painter.set_color(*c),
            Action::SetMask(source) => {
                let mask = source.read_mask(region)?;
                painter.set_mask(mask.into_raw())?;
            }
            Action::InvertMask => painter.invert_mask(),
            Action::SetPixel { x, y } => {
                if let (Some(lx), Some(ly)) = (x.checked_sub(ox), y.checked_sub(oy)) {
                    lease.with_canvas(|c| painter.set_pixel(c, lx, ly))?;
                }
            }
            Action::MoveTo(p) => painter.move_to(*p - shift),
            Action::LineTo(p) => painter.line_to(*p - shift),
            Action::ClosePath => painter.close_path(),
            Action::DrawRectangle { x, y, w, h } => {
                painter.draw_rectangle(x - shift.x, y - shift.y, *w, *h);
            }
            Action::RotateAbout { angle, center } => painter.rotate_about(*angle, *center - shift),
            Action::DrawEllipse { center, rx, ry } => {
                painter.draw_ellipse(*center - shift, *rx, *ry);
            }
            Action::Fill => lease.with_canvas(|c| painter.fill(c))?,
            Action::Stroke => lease.with_canvas(|c| painter.stroke(c))?,
            Action::Clear => lease.with_canvas(|c| painter.clear(c))?,
            Action::DrawImage { image, x, y } => {
                if let (Some(lx), Some(ly)) = (x.checked_sub(ox), y.checked_sub(oy)) {
                    lease.with_canvas(|c| painter.draw_image(c, image, lx, ly))?;
                }
            }
        }
        if self.mutates() {
            lease.mark_dirty();
        }
        Ok(())
    }
}
