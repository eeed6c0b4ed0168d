//! Mapping between global pixel coordinates and the chunk grid.

use crate::foundation::core::{ChunkKey, PixelRect};

/// Chunk grid over a bounded canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkGrid {
    bounds: PixelRect,
    chunk_size: u32,
}

impl ChunkGrid {
    /// `chunk_size` must be non-zero; callers validate it before construction.
    pub(crate) fn new(bounds: PixelRect, chunk_size: u32) -> Self {
        debug_assert!(chunk_size > 0);
        Self { bounds, chunk_size }
    }

    /// Canvas bounds.
    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    /// Side of a square chunk in pixels.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Chunk containing global pixel `(x, y)` plus whether the pixel is inside the canvas.
    pub fn to_chunk(&self, x: i64, y: i64) -> (ChunkKey, bool) {
        let size = i64::from(self.chunk_size);
        let key = ChunkKey::new(x.div_euclid(size), y.div_euclid(size));
        (key, self.bounds.contains(x, y))
    }

    /// Global pixel coordinate of the top-left corner of `key`.
    pub fn chunk_origin(&self, key: ChunkKey) -> (i64, i64) {
        let size = i64::from(self.chunk_size);
        (key.x * size, key.y * size)
    }

    /// Global rectangle covered by `key`, ignoring the canvas bounds.
    pub fn chunk_rect(&self, key: ChunkKey) -> PixelRect {
        let (x, y) = self.chunk_origin(key);
        PixelRect::from_origin_size(x, y, self.chunk_size, self.chunk_size)
    }

    /// Every chunk intersecting the half-open rectangle `rect`, clipped to the canvas.
    ///
    /// Keys are produced lazily, one grid column at a time. The high edge of `rect` is exclusive,
    /// so a rectangle ending exactly on a chunk seam does not reach into the next chunk.
    pub fn chunks_within(&self, rect: PixelRect) -> ChunksWithin {
        let clipped = rect.intersect(self.bounds);
        if clipped.is_empty() {
            return ChunksWithin::empty();
        }
        let (first, _) = self.to_chunk(clipped.min_x, clipped.min_y);
        let (last, _) = self.to_chunk(clipped.max_x - 1, clipped.max_y - 1);
        ChunksWithin {
            first,
            last,
            next: Some(first),
        }
    }
}

/// Lazy sequence of chunk keys spanning a rectangle of the grid.
#[derive(Clone, Debug)]
pub struct ChunksWithin {
    first: ChunkKey,
    last: ChunkKey,
    next: Option<ChunkKey>,
}

impl ChunksWithin {
    fn empty() -> Self {
        Self {
            first: ChunkKey::new(0, 0),
            last: ChunkKey::new(0, 0),
            next: None,
        }
    }
}

impl Iterator for ChunksWithin {
    type Item = ChunkKey;

    fn next(&mut self) -> Option<ChunkKey> {
        let cur = self.next?;
        self.next = if cur.y < self.last.y {
            Some(ChunkKey::new(cur.x, cur.y + 1))
        } else if cur.x < self.last.x {
            Some(ChunkKey::new(cur.x + 1, self.first.y))
        } else {
            None
        };
        Some(cur)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let Some(cur) = self.next else {
            return (0, Some(0));
        };
        let rows = (self.last.y - self.first.y + 1) as usize;
        let full_cols = (self.last.x - cur.x) as usize;
        let remaining = full_cols * rows + (self.last.y - cur.y + 1) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunksWithin {}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn grid() -> ChunkGrid {
        ChunkGrid::new(PixelRect::new(0, 0, 1000, 1000), 500)
    }

    #[test]
    fn to_chunk_floors_and_checks_bounds() {
        let g = grid();
        assert_eq!(g.to_chunk(0, 0), (ChunkKey::new(0, 0), true));
        assert_eq!(g.to_chunk(499, 500), (ChunkKey::new(0, 1), true));
        assert_eq!(g.to_chunk(999, 10), (ChunkKey::new(1, 0), true));
        assert_eq!(g.to_chunk(1000, 10), (ChunkKey::new(2, 0), false));
        assert_eq!(g.to_chunk(-1, 10), (ChunkKey::new(-1, 0), false));
    }

    #[test]
    fn to_chunk_checks_x_against_x_extent() {
        let g = ChunkGrid::new(PixelRect::new(0, 0, 100, 1000), 50);
        assert!(!g.to_chunk(500, 10).1);
    }

    #[test]
    fn rect_inside_one_chunk_yields_one_key() {
        let g = grid();
        for r in [
            PixelRect::new(0, 0, 1, 1),
            PixelRect::new(10, 20, 400, 499),
            PixelRect::new(500, 500, 1000, 1000),
            PixelRect::new(0, 0, 500, 500),
        ] {
            let keys: Vec<_> = g.chunks_within(r).collect();
            assert_eq!(keys.len(), 1, "{r:?}");
        }
    }

    #[test]
    fn spanning_rect_yields_exact_span_without_duplicates() {
        let g = ChunkGrid::new(PixelRect::new(0, 0, 1000, 1000), 100);
        let keys: Vec<_> = g.chunks_within(PixelRect::new(150, 250, 420, 301)).collect();
        let set: HashSet<_> = keys.iter().copied().collect();
        assert_eq!(keys.len(), set.len());

        let mut expected = HashSet::new();
        for x in 1..=4 {
            for y in 2..=3 {
                expected.insert(ChunkKey::new(x, y));
            }
        }
        assert_eq!(set, expected);
    }

    #[test]
    fn rect_outside_or_empty_yields_nothing() {
        let g = grid();
        assert_eq!(g.chunks_within(PixelRect::new(1000, 0, 1200, 10)).count(), 0);
        assert_eq!(g.chunks_within(PixelRect::new(10, 10, 10, 20)).count(), 0);
        assert_eq!(g.chunks_within(PixelRect::new(-50, -50, 0, 0)).count(), 0);
    }

    #[test]
    fn rect_is_clipped_to_bounds() {
        let g = grid();
        let keys: Vec<_> = g
            .chunks_within(PixelRect::new(-1000, -1000, 5000, 5000))
            .collect();
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn negative_bounds_map_to_negative_chunks() {
        let g = ChunkGrid::new(PixelRect::new(-100, -100, 100, 100), 100);
        let keys: HashSet<_> = g
            .chunks_within(PixelRect::new(-1, -1, 1, 1))
            .collect();
        assert_eq!(keys.len(), 4);
        assert!(keys.contains(&ChunkKey::new(-1, -1)));
        assert!(keys.contains(&ChunkKey::new(0, 0)));
    }

    #[test]
    fn size_hint_tracks_remaining_keys() {
        let g = ChunkGrid::new(PixelRect::new(0, 0, 1000, 1000), 100);
        let mut it = g.chunks_within(PixelRect::new(0, 0, 300, 200));
        assert_eq!(it.len(), 6);
        it.next();
        it.next();
        it.next();
        assert_eq!(it.len(), 3);
        assert_eq!(it.by_ref().count(), 3);
        assert_eq!(it.len(), 0);
    }
}
