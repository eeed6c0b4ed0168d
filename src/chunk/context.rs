use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::chunk::cache::CacheCounters;
use crate::chunk::store::ChunkStore;
use crate::foundation::core::ChunkKey;
use crate::foundation::error::{MimageError, MimageResult};
use crate::raster::canvas::ChunkCanvas;

/// Lifecycle of one chunk: lazy materialization, dirty tracking and unload-to-disk.
///
/// Two locks guard a chunk:
/// - `gate` is held shared by every in-flight user and exclusively by an unload. Eviction only
///   ever *tries* the exclusive side, so it never waits behind a user.
/// - `canvas` serializes materialization and every access to the pixels.
pub(crate) struct ChunkContext {
    key: ChunkKey,
    size: u16,
    store: Arc<ChunkStore>,
    counters: Arc<CacheCounters>,
    gate: RwLock<()>,
    canvas: Mutex<Option<ChunkCanvas>>,
    dirty: AtomicBool,
}

impl std::fmt::Debug for ChunkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkContext")
            .field("key", &self.key)
            .field("resident", &self.is_resident())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

impl ChunkContext {
    pub(crate) fn new(
        key: ChunkKey,
        size: u16,
        store: Arc<ChunkStore>,
        counters: Arc<CacheCounters>,
    ) -> Self {
        Self {
            key,
            size,
            store,
            counters,
            gate: RwLock::new(()),
            canvas: Mutex::new(None),
            dirty: AtomicBool::new(false),
        }
    }

    pub(crate) fn key(&self) -> ChunkKey {
        self.key
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn is_resident(&self) -> bool {
        self.canvas.lock().is_some()
    }

    /// Take an in-use token and make sure the canvas is in memory.
    ///
    /// The token lives in the returned lease. If materialization fails the token is dropped
    /// before the error is returned, so the evictor is never left waiting on a failed user.
    ///
    /// The shared side is taken recursively: a thread that already holds a lease on this chunk
    /// (a mask read from the image being drawn) must not queue behind a pending writer.
    pub(crate) fn acquire(&self) -> MimageResult<ChunkLease<'_>> {
        let in_use = self.gate.read_recursive();
        self.materialize()?;
        Ok(ChunkLease {
            ctx: self,
            _in_use: in_use,
        })
    }

    fn materialize(&self) -> MimageResult<()> {
        let mut slot = self.canvas.lock();
        if slot.is_some() {
            return Ok(());
        }
        let canvas = match self.store.read(self.key)? {
            None => {
                CacheCounters::bump(&self.counters.blank_materializations);
                tracing::debug!(key = %self.key, "materialized blank chunk");
                ChunkCanvas::blank(self.size)
            }
            Some(bytes) => {
                let canvas = ChunkCanvas::decode(self.key, &bytes, self.size)?;
                CacheCounters::bump(&self.counters.disk_materializations);
                tracing::debug!(key = %self.key, bytes = bytes.len(), "loaded chunk from disk");
                canvas
            }
        };
        *slot = Some(canvas);
        Ok(())
    }

    /// Unload the chunk if nobody is using it. Returns whether the canvas was dropped.
    pub(crate) fn evict_if_idle(&self) -> bool {
        let Some(_exclusive) = self.gate.try_write() else {
            return false;
        };
        let mut slot = self.canvas.lock();
        if slot.is_none() {
            return false;
        }
        match self.unload_locked(&mut slot) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "chunk persist failed, keeping it in memory");
                false
            }
        }
    }

    /// Block until the exclusive gate is free. Used by a full flush, which holds every chunk.
    pub(crate) fn lock_exclusive(&self) -> parking_lot::RwLockWriteGuard<'_, ()> {
        self.gate.write()
    }

    /// Unload while the caller holds the exclusive gate (see [`Self::lock_exclusive`]).
    pub(crate) fn unload_exclusive(&self) -> MimageResult<()> {
        let mut slot = self.canvas.lock();
        self.unload_locked(&mut slot)
    }

    /// Persist if dirty, then drop the canvas. On persist failure the canvas and dirty flag stay.
    fn unload_locked(&self, slot: &mut Option<ChunkCanvas>) -> MimageResult<()> {
        let Some(canvas) = slot.as_ref() else {
            return Ok(());
        };
        if self.is_dirty() {
            if let Err(err) = self.persist(canvas) {
                CacheCounters::bump(&self.counters.persist_failures);
                return Err(err);
            }
            self.dirty.store(false, Ordering::Release);
        }
        *slot = None;
        CacheCounters::bump(&self.counters.evictions);
        tracing::debug!(key = %self.key, "evicted chunk");
        Ok(())
    }

    fn persist(&self, canvas: &ChunkCanvas) -> MimageResult<()> {
        let bytes = canvas.encode(self.key)?;
        self.store.write(self.key, &bytes)?;
        CacheCounters::bump(&self.counters.persists);
        tracing::debug!(key = %self.key, bytes = bytes.len(), "persisted chunk");
        Ok(())
    }
}

/// Proof that a chunk is resident and pinned against eviction. Dropping it releases the chunk.
pub(crate) struct ChunkLease<'a> {
    ctx: &'a ChunkContext,
    _in_use: RwLockReadGuard<'a, ()>,
}

impl ChunkLease<'_> {
    pub(crate) fn key(&self) -> ChunkKey {
        self.ctx.key
    }

    /// Run `f` with the canvas locked. Keep `f` short and never acquire other chunks inside it.
    pub(crate) fn with_canvas<R>(&self, f: impl FnOnce(&mut ChunkCanvas) -> R) -> MimageResult<R> {
        let mut slot = self.ctx.canvas.lock();
        let canvas = slot.as_mut().ok_or_else(|| {
            MimageError::internal(format!("leased chunk {} is not resident", self.ctx.key))
        })?;
        Ok(f(canvas))
    }

    pub(crate) fn mark_dirty(&self) {
        self.ctx.dirty.store(true, Ordering::Release);
    }
}
