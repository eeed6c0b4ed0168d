use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::chunk::context::{ChunkContext, ChunkLease};
use crate::chunk::store::ChunkStore;
use crate::foundation::core::ChunkKey;
use crate::foundation::error::{MimageError, MimageResult};

/// Snapshot of cache activity since the image was opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Chunks with a tracking entry. Entries are never removed.
    pub chunks_tracked: usize,
    /// Canvases created blank because no artifact existed.
    pub blank_materializations: u64,
    /// Canvases decoded from a persisted artifact.
    pub disk_materializations: u64,
    /// Canvases dropped from memory.
    pub evictions: u64,
    /// Successful artifact writes.
    pub persists: u64,
    /// Artifact writes that failed; the canvas stayed in memory.
    pub persist_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub(crate) blank_materializations: AtomicU64,
    pub(crate) disk_materializations: AtomicU64,
    pub(crate) evictions: AtomicU64,
    pub(crate) persists: AtomicU64,
    pub(crate) persist_failures: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct Shutdown {
    stopped: Mutex<bool>,
    wake: Condvar,
}

type Registry = Mutex<HashMap<ChunkKey, Arc<ChunkContext>>>;

/// Registry of chunk contexts for one image.
///
/// Entries are created on first use and live as long as the cache. A single evictor thread visits
/// every entry once per interval and unloads the idle ones; [`ChunkCache::shutdown`] stops and
/// joins it.
pub(crate) struct ChunkCache {
    store: Arc<ChunkStore>,
    chunk_size: u16,
    registry: Arc<Registry>,
    evictor: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Shutdown>,
    counters: Arc<CacheCounters>,
}

impl ChunkCache {
    pub(crate) fn new(
        store: ChunkStore,
        chunk_size: u16,
        evict_interval: Duration,
    ) -> MimageResult<Self> {
        let registry = Arc::new(Registry::default());
        let shutdown = Arc::new(Shutdown::default());
        let evictor = {
            let registry = Arc::clone(&registry);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("mimage-evict".to_owned())
                .spawn(move || run_evictor(&registry, &shutdown, evict_interval))
                .map_err(|e| MimageError::internal(format!("spawn chunk evictor: {e}")))?
        };
        Ok(Self {
            store: Arc::new(store),
            chunk_size,
            registry,
            evictor: Mutex::new(Some(evictor)),
            shutdown,
            counters: Arc::new(CacheCounters::default()),
        })
    }

    pub(crate) fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Acquire `key` and run `f` against it. The chunk is released when this returns.
    ///
    /// The registry lock is only held to find or insert the context; materialization happens
    /// outside it so unrelated chunks load in parallel.
    pub(crate) fn load<R>(&self, key: ChunkKey, f: impl FnOnce(&ChunkLease<'_>) -> R) -> MimageResult<R> {
        let ctx = self.context(key);
        let lease = ctx.acquire()?;
        Ok(f(&lease))
    }

    pub(crate) fn context(&self, key: ChunkKey) -> Arc<ChunkContext> {
        let mut registry = self.registry.lock();
        let ctx = registry.entry(key).or_insert_with(|| {
            Arc::new(ChunkContext::new(
                key,
                self.chunk_size,
                Arc::clone(&self.store),
                Arc::clone(&self.counters),
            ))
        });
        Arc::clone(ctx)
    }

    /// Persist every dirty chunk and drop every resident canvas.
    ///
    /// Holds the registry and every chunk's exclusive gate for the whole call, so it must not run
    /// while an operation is in flight. Every chunk is attempted; the first failure is returned.
    #[tracing::instrument(skip(self), fields(root = %self.store.root().display()))]
    pub(crate) fn flush_all(&self) -> MimageResult<()> {
        let registry = self.registry.lock();
        let held: Vec<_> = registry
            .values()
            .map(|ctx| (ctx, ctx.lock_exclusive()))
            .collect();

        let mut first_err = None;
        for (ctx, _exclusive) in &held {
            if let Err(err) = ctx.unload_exclusive() {
                tracing::warn!(key = %ctx.key(), error = %err, "flush failed for chunk");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Stop the evictor, wait for it, then flush. Safe to call more than once.
    pub(crate) fn shutdown(&self) -> MimageResult<()> {
        self.signal_stop();
        if let Some(handle) = self.evictor.lock().take()
            && handle.join().is_err()
        {
            tracing::warn!("chunk evictor thread panicked");
        }
        self.flush_all()
    }

    fn signal_stop(&self) {
        *self.shutdown.stopped.lock() = true;
        self.shutdown.wake.notify_all();
    }

    pub(crate) fn stats(&self) -> CacheStats {
        let c = &self.counters;
        CacheStats {
            chunks_tracked: self.registry.lock().len(),
            blank_materializations: c.blank_materializations.load(Ordering::Relaxed),
            disk_materializations: c.disk_materializations.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            persists: c.persists.load(Ordering::Relaxed),
            persist_failures: c.persist_failures.load(Ordering::Relaxed),
        }
    }

    /// Keys whose in-memory canvas differs from disk, sorted.
    pub(crate) fn dirty_keys(&self) -> Vec<ChunkKey> {
        let mut keys: Vec<_> = self
            .registry
            .lock()
            .values()
            .filter(|ctx| ctx.is_dirty())
            .map(|ctx| ctx.key())
            .collect();
        keys.sort();
        keys
    }
}

impl Drop for ChunkCache {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

fn run_evictor(registry: &Registry, shutdown: &Shutdown, interval: Duration) {
    let mut stopped = shutdown.stopped.lock();
    while !*stopped {
        let deadline = Instant::now() + interval;
        while !*stopped && !shutdown.wake.wait_until(&mut stopped, deadline).timed_out() {}
        if *stopped {
            break;
        }
        parking_lot::MutexGuard::unlocked(&mut stopped, || sweep(registry, shutdown));
    }
}

/// Try to unload every tracked chunk once. The registry is only locked to snapshot its entries.
fn sweep(registry: &Registry, shutdown: &Shutdown) {
    let contexts: Vec<_> = registry.lock().values().map(Arc::clone).collect();
    let mut evicted = 0usize;
    for ctx in contexts {
        if *shutdown.stopped.lock() {
            return;
        }
        if ctx.evict_if_idle() {
            evicted += 1;
        }
    }
    if evicted > 0 {
        tracing::debug!(evicted, "evictor sweep");
    }
}
