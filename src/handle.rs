use std::path::Path;

use crate::chunk::cache::{CacheStats, ChunkCache};
use crate::chunk::store::ChunkStore;
use crate::config::{CacheOpts, Metadata, MimageOpts, prepare_directory};
use crate::foundation::core::{ChunkKey, PixelRect, Rgba8};
use crate::foundation::error::{MimageError, MimageResult};
use crate::grid::ChunkGrid;
use crate::operation::Operation;

/// A disk-backed image split into square chunks.
///
/// Only the chunks an operation or read touches are held in memory; idle chunks are written back
/// and dropped by a background evictor that revisits every chunk on a fixed interval. Call
/// [`Mimage::close`] to stop it and persist everything; dropping the handle does the same but can
/// only log failures.
pub struct Mimage {
    grid: ChunkGrid,
    chunk_size: u16,
    workers: usize,
    cache: ChunkCache,
    closed: bool,
}

impl std::fmt::Debug for Mimage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mimage")
            .field("bounds", &self.grid.bounds())
            .field("chunk_size", &self.chunk_size)
            .field("workers", &self.workers)
            .field("directory", &self.directory())
            .finish()
    }
}

impl Mimage {
    /// Create a new, fully transparent image covering `bounds`.
    #[tracing::instrument(skip(opts), fields(chunk_size = opts.chunk_size))]
    pub fn create(bounds: PixelRect, opts: MimageOpts) -> MimageResult<Self> {
        if bounds.is_empty() {
            return Err(MimageError::validation(format!(
                "image bounds must not be empty, got {bounds:?}"
            )));
        }
        let chunk_size = opts.validated_chunk_size()?;
        let workers = opts.workers.max(1);
        let dir = prepare_directory(opts.directory.as_deref())?;
        Metadata::new(bounds, chunk_size, workers).write(&dir)?;
        tracing::info!(dir = %dir.display(), "created image");
        Self::assemble(bounds, chunk_size, workers, ChunkStore::new(dir), opts.cache)
    }

    /// Open an image previously created in `dir`.
    #[tracing::instrument(skip(dir, cache), fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>, cache: CacheOpts) -> MimageResult<Self> {
        let dir = dir.as_ref();
        let meta = Metadata::read(dir)?;
        let chunk_size = meta.chunk_size_u16()?;
        let bounds = meta.bounds();
        tracing::info!(?bounds, chunk_size, "opened image");
        Self::assemble(
            bounds,
            chunk_size,
            meta.workers.max(1),
            ChunkStore::new(dir),
            cache,
        )
    }

    fn assemble(
        bounds: PixelRect,
        chunk_size: u16,
        workers: usize,
        store: ChunkStore,
        cache: CacheOpts,
    ) -> MimageResult<Self> {
        Ok(Self {
            grid: ChunkGrid::new(bounds, u32::from(chunk_size)),
            chunk_size,
            workers,
            cache: ChunkCache::new(store, chunk_size, cache.evict_interval)?,
            closed: false,
        })
    }

    /// Start a batch of drawing calls.
    pub fn draw(&self) -> Operation<'_> {
        Operation::new(self)
    }

    /// Image bounds in global pixel coordinates.
    pub fn bounds(&self) -> PixelRect {
        self.grid.bounds()
    }

    /// Width in pixels.
    pub fn width(&self) -> i64 {
        self.bounds().width()
    }

    /// Height in pixels.
    pub fn height(&self) -> i64 {
        self.bounds().height()
    }

    /// Side of a chunk in pixels.
    pub fn chunk_size(&self) -> u32 {
        u32::from(self.chunk_size)
    }

    /// Default worker count for new operations.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Directory holding the metadata and chunk artifacts.
    pub fn directory(&self) -> &Path {
        self.cache.store().root()
    }

    /// Chunk grid of this image.
    pub fn grid(&self) -> &ChunkGrid {
        &self.grid
    }

    /// Cache counters, mostly useful for diagnostics and tests.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Chunks changed in memory but not yet written to disk.
    pub fn dirty_chunks(&self) -> Vec<ChunkKey> {
        self.cache.dirty_keys()
    }

    pub(crate) fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    pub(crate) fn chunk_size_u16(&self) -> u16 {
        self.chunk_size
    }

    /// Copy `rect` into a straight-alpha RGBA image. Pixels outside the bounds are transparent.
    ///
    /// Stops at the first chunk that cannot be loaded.
    pub fn read_region(&self, rect: PixelRect) -> MimageResult<image::RgbaImage> {
        let (w, h) = region_size(rect)?;
        let mut out = image::RgbaImage::new(w, h);
        self.for_each_chunk_pixel(rect, |x, y, px| {
            out.put_pixel(x, y, Rgba8::from_premultiplied(px).into());
        })?;
        Ok(out)
    }

    /// Alpha channel of `rect` as a grayscale image. Pixels outside the bounds are `0`.
    ///
    /// Stops at the first chunk that cannot be loaded.
    pub fn read_mask(&self, rect: PixelRect) -> MimageResult<image::GrayImage> {
        let (w, h) = region_size(rect)?;
        let mut out = image::GrayImage::new(w, h);
        self.for_each_chunk_pixel(rect, |x, y, px| {
            out.put_pixel(x, y, image::Luma([px[3]]));
        })?;
        Ok(out)
    }

    /// Color at one global pixel. Outside the bounds this is transparent and loads nothing.
    pub fn pixel_at(&self, x: i64, y: i64) -> MimageResult<Rgba8> {
        let (key, in_bounds) = self.grid.to_chunk(x, y);
        if !in_bounds {
            return Ok(Rgba8::TRANSPARENT);
        }
        let (ox, oy) = self.grid.chunk_origin(key);
        self.cache.load(key, |lease| {
            lease.with_canvas(|c| c.color((x - ox) as u32, (y - oy) as u32))
        })?
    }

    /// Visit every in-bounds pixel of `rect` as premultiplied RGBA, with coordinates relative to
    /// `rect`'s corner. Each chunk's canvas is copied out before `f` runs on it.
    fn for_each_chunk_pixel(
        &self,
        rect: PixelRect,
        mut f: impl FnMut(u32, u32, [u8; 4]),
    ) -> MimageResult<()> {
        for key in self.grid.chunks_within(rect) {
            let chunk = self.grid.chunk_rect(key);
            let part = chunk.intersect(rect).intersect(self.bounds());
            let pixels = self.cache.load(key, |lease| {
                lease.with_canvas(|c| {
                    let mut pixels = Vec::with_capacity((part.width() * part.height()) as usize);
                    for y in part.min_y..part.max_y {
                        for x in part.min_x..part.max_x {
                            pixels.push(c.pixel((x - chunk.min_x) as u32, (y - chunk.min_y) as u32));
                        }
                    }
                    pixels
                })
            })??;
            let mut it = pixels.into_iter();
            for y in part.min_y..part.max_y {
                for x in part.min_x..part.max_x {
                    if let Some(px) = it.next() {
                        f((x - rect.min_x) as u32, (y - rect.min_y) as u32, px);
                    }
                }
            }
        }
        Ok(())
    }

    /// Write every dirty chunk to disk and drop resident canvases.
    ///
    /// Must not run while an operation on this image is executing.
    pub fn flush(&self) -> MimageResult<()> {
        self.cache.flush_all()
    }

    /// Stop the background evictor and flush. Returns the first persist failure.
    pub fn close(mut self) -> MimageResult<()> {
        self.closed = true;
        self.cache.shutdown()
    }
}

impl Drop for Mimage {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.cache.shutdown() {
            tracing::error!(dir = %self.directory().display(), error = %err, "failed to flush image on drop");
        }
    }
}

fn region_size(rect: PixelRect) -> MimageResult<(u32, u32)> {
    let w = u32::try_from(rect.width());
    let h = u32::try_from(rect.height());
    match (w, h) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(MimageError::validation(format!(
            "region {rect:?} is too large to read"
        ))),
    }
}
