//! Deferred drawing batches and their fan-out across chunks.

mod action;
mod bbox;

use std::sync::Arc;

use kurbo::{Point, Rect};
use rayon::prelude::*;

use crate::foundation::core::{ChunkKey, PixelRect, Rgba8};
use crate::foundation::error::{ChunkFailure, MimageError, MimageResult, OperationError};
use crate::handle::Mimage;
use crate::raster::painter::Painter;
use crate::raster::pattern::Pattern;

use action::Action;
use bbox::BoundingBox;

/// An ordered batch of drawing calls against one [`Mimage`].
///
/// Queuing calls only record the action and grow the operation's bounding box; nothing touches
/// pixels until [`Operation::execute`]. Execution replays the whole queue, in order, once per chunk
/// intersecting the padded bounding box, on a pool of `workers` threads.
///
/// Each replay starts from a fresh drawing state: identity transform, empty path, opaque black,
/// line width 1 and no mask.
///
/// Only one operation may execute against an image at a time; concurrent executions on the same
/// image are not serialized and their result is unspecified.
#[derive(Debug)]
#[must_use = "an operation does nothing until `execute` is called"]
pub struct Operation<'a> {
    image: &'a Mimage,
    actions: Vec<Action<'a>>,
    bbox: BoundingBox,
    workers: usize,
    invalid: Option<String>,
}

impl<'a> Operation<'a> {
    pub(crate) fn new(image: &'a Mimage) -> Self {
        Self {
            image,
            actions: Vec::new(),
            bbox: BoundingBox::default(),
            workers: image.workers(),
            invalid: None,
        }
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Return `true` when nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Worker threads used by [`Operation::execute`]. `0` is treated as `1`.
    pub fn set_workers(&mut self, workers: usize) -> &mut Self {
        self.workers = workers.max(1);
        self
    }

    /// Global pixels the operation may change, after padding by the widest line and clipping.
    pub fn affected_rect(&self) -> PixelRect {
        self.bbox.affected(self.image.bounds())
    }

    fn check(&mut self, ok: bool, what: impl FnOnce() -> String) {
        if !ok && self.invalid.is_none() {
            self.invalid = Some(what());
        }
    }

    fn check_finite(&mut self, call: &str, values: &[f64]) {
        let ok = values.iter().all(|v| v.is_finite());
        self.check(ok, || format!("{call}: arguments must be finite, got {values:?}"));
    }

    /// Paint subsequent fills with `pattern`.
    pub fn set_fill_style(&mut self, pattern: impl Pattern + 'static) -> &mut Self {
        self.actions.push(Action::SetFillStyle(Arc::new(pattern)));
        self
    }

    /// Paint subsequent strokes with `pattern`.
    pub fn set_stroke_style(&mut self, pattern: impl Pattern + 'static) -> &mut Self {
        self.actions.push(Action::SetStrokeStyle(Arc::new(pattern)));
        self
    }

    /// Stroke width in pixels. Must be finite and non-negative.
    pub fn set_line_width(&mut self, width: f64) -> &mut Self {
        self.check(width.is_finite() && width >= 0.0, || {
            format!("set_line_width: width must be finite and >= 0, got {width}")
        });
        self.bbox.grow_line_width(width);
        self.actions.push(Action::SetLineWidth(width));
        self
    }

    /// Solid color for pixels, fills, strokes and clears.
    pub fn set_color(&mut self, color: Rgba8) -> &mut Self {
        self.actions.push(Action::SetColor(color));
        self
    }

    /// Use the alpha channel of `source` as a mask for subsequent paint.
    ///
    /// The mask is read per chunk at execution time from the same global region. A mask value of
    /// 255 shields a pixel completely. `source` may be the image being drawn.
    pub fn set_mask(&mut self, source: &'a Mimage) -> &mut Self {
        self.actions.push(Action::SetMask(source));
        self
    }

    /// Flip the current mask. With no mask set, everything becomes shielded.
    pub fn invert_mask(&mut self) -> &mut Self {
        self.actions.push(Action::InvertMask);
        self
    }

    /// Write the current color to one pixel, ignoring the transform.
    pub fn set_pixel(&mut self, x: i64, y: i64) -> &mut Self {
        self.bbox
            .include_pixels(PixelRect::new(x, y, x.saturating_add(1), y.saturating_add(1)));
        self.actions.push(Action::SetPixel { x, y });
        self
    }

    /// Start a new sub-path at `(x, y)`.
    pub fn move_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.check_finite("move_to", &[x, y]);
        self.bbox.include_point(Point::new(x, y));
        self.actions.push(Action::MoveTo(Point::new(x, y)));
        self
    }

    /// Add a line to `(x, y)`. Without a current point this starts a sub-path.
    pub fn line_to(&mut self, x: f64, y: f64) -> &mut Self {
        self.check_finite("line_to", &[x, y]);
        self.bbox.include_point(Point::new(x, y));
        self.actions.push(Action::LineTo(Point::new(x, y)));
        self
    }

    /// Close the current sub-path.
    pub fn close_path(&mut self) -> &mut Self {
        self.actions.push(Action::ClosePath);
        self
    }

    /// Add a closed rectangle with top-left corner `(x, y)`.
    pub fn draw_rectangle(&mut self, x: f64, y: f64, w: f64, h: f64) -> &mut Self {
        self.check_finite("draw_rectangle", &[x, y, w, h]);
        self.bbox.include_shape(Rect::new(x, y, x + w, y + h));
        self.actions.push(Action::DrawRectangle { x, y, w, h });
        self
    }

    /// Rotate subsequent geometry by `angle` radians about `(x, y)`.
    pub fn rotate_about(&mut self, angle: f64, x: f64, y: f64) -> &mut Self {
        self.check_finite("rotate_about", &[angle, x, y]);
        let center = Point::new(x, y);
        self.bbox.rotate_about(angle, center);
        self.actions.push(Action::RotateAbout { angle, center });
        self
    }

    /// Add a closed axis-aligned ellipse centred on `(x, y)`.
    pub fn draw_ellipse(&mut self, x: f64, y: f64, rx: f64, ry: f64) -> &mut Self {
        self.check_finite("draw_ellipse", &[x, y, rx, ry]);
        let (rx, ry) = (rx.abs(), ry.abs());
        self.bbox
            .include_shape(Rect::new(x - rx, y - ry, x + rx, y + ry));
        self.actions.push(Action::DrawEllipse {
            center: Point::new(x, y),
            rx,
            ry,
        });
        self
    }

    /// Fill the current path with the fill style, then clear the path.
    pub fn fill(&mut self) -> &mut Self {
        self.actions.push(Action::Fill);
        self
    }

    /// Stroke the current path with the stroke style, then clear the path.
    pub fn stroke(&mut self) -> &mut Self {
        self.actions.push(Action::Stroke);
        self
    }

    /// Replace every pixel of the image with the current color. Visits every chunk.
    pub fn clear(&mut self) -> &mut Self {
        self.bbox.cover_all();
        self.actions.push(Action::Clear);
        self
    }

    /// Composite `image` source-over with its top-left corner at `(x, y)`, ignoring the transform.
    pub fn draw_image(&mut self, image: impl Into<Arc<image::RgbaImage>>, x: i64, y: i64) -> &mut Self {
        let image = image.into();
        self.bbox
            .include_pixels(PixelRect::from_origin_size(x, y, image.width(), image.height()));
        self.actions.push(Action::DrawImage { image, x, y });
        self
    }

    /// Replay the queue against every affected chunk.
    ///
    /// Failures on individual chunks do not stop the others; they are collected into a single
    /// [`MimageError::Operation`]. Chunks that were already changed stay changed. On success every
    /// affected chunk has been updated in memory, not necessarily on disk; call
    /// [`Mimage::flush`] for durability.
    #[tracing::instrument(skip(self), fields(actions = self.actions.len(), workers = self.workers))]
    pub fn execute(self) -> MimageResult<()> {
        if let Some(msg) = self.invalid.as_deref() {
            return Err(MimageError::validation(msg));
        }
        if self.actions.is_empty() {
            return Ok(());
        }

        let area = self.affected_rect();
        let keys = self.image.grid().chunks_within(area);
        let chunk_count = keys.len();
        if chunk_count == 0 {
            return Ok(());
        }
        tracing::debug!(?area, chunk_count, "executing operation");

        let pool = build_thread_pool(self.workers)?;
        let failures: Vec<ChunkFailure> = pool.install(|| {
            keys.par_bridge()
                .filter_map(|key| {
                    self.replay_on(key)
                        .err()
                        .map(|error| ChunkFailure { key, error })
                })
                .collect()
        });

        if failures.is_empty() {
            return Ok(());
        }
        tracing::warn!(failed = failures.len(), chunk_count, "operation failed on some chunks");
        Err(OperationError::new(failures).into())
    }

    fn replay_on(&self, key: ChunkKey) -> MimageResult<()> {
        let grid = self.image.grid();
        let region = grid.chunk_rect(key);
        let size = self.image.chunk_size_u16();
        self.image.cache().load(key, |lease| -> MimageResult<()> {
            let mut painter = Painter::new(size, (region.min_x, region.min_y));
            for action in &self.actions {
                action.replay(&mut painter, lease, region)?;
            }
            Ok(())
        })?
    }
}

fn build_thread_pool(workers: usize) -> MimageResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("mimage-op-{i}"))
        .build()
        .map_err(|e| MimageError::internal(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheOpts, MimageOpts};

    fn image(dir: &std::path::Path) -> Mimage {
        let opts = MimageOpts {
            chunk_size: 100,
            directory: Some(dir.join("img")),
            workers: 2,
            cache: CacheOpts {
                evict_interval: std::time::Duration::from_secs(3600),
            },
        };
        Mimage::create(PixelRect::new(0, 0, 400, 300), opts).unwrap()
    }

    #[test]
    fn invalid_arguments_fail_before_touching_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(dir.path());
        let mut op = img.draw();
        op.draw_rectangle(10.0, 10.0, 20.0, 20.0)
            .set_line_width(-1.0)
            .move_to(f64::NAN, 0.0)
            .fill();
        let err = op.execute().unwrap_err();
        assert!(matches!(&err, MimageError::Validation(m) if m.contains("set_line_width")));
        assert_eq!(img.cache_stats().chunks_tracked, 0);
    }

    #[test]
    fn empty_operation_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(dir.path());
        let op = img.draw();
        assert!(op.is_empty());
        op.execute().unwrap();
        assert_eq!(img.cache_stats().chunks_tracked, 0);
    }

    #[test]
    fn state_only_actions_touch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(dir.path());
        let mut op = img.draw();
        op.set_color(Rgba8::WHITE).set_line_width(3.0).fill();
        assert!(op.affected_rect().is_empty());
        op.execute().unwrap();
        assert_eq!(img.cache_stats().chunks_tracked, 0);
    }

    #[test]
    fn only_chunks_in_the_padded_box_are_visited() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(dir.path());
        let mut op = img.draw();
        op.set_color(Rgba8::opaque(0, 0, 255))
            .draw_rectangle(110.0, 10.0, 50.0, 50.0)
            .fill();
        assert_eq!(op.affected_rect(), PixelRect::new(109, 9, 161, 61));
        op.execute().unwrap();
        assert_eq!(img.cache_stats().chunks_tracked, 1);
        assert_eq!(img.dirty_chunks(), vec![ChunkKey::new(1, 0)]);
    }

    #[test]
    fn clear_visits_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let img = image(dir.path());
        let mut op = img.draw();
        op.set_color(Rgba8::WHITE).clear().set_workers(0);
        op.execute().unwrap();
        assert_eq!(img.dirty_chunks().len(), 12);
        assert_eq!(img.pixel_at(399, 299).unwrap(), Rgba8::WHITE);
    }
}
