//! Chunk paging: on-disk artifacts, per-chunk lifecycle and the owning registry.

pub(crate) mod cache;
pub(crate) mod context;
pub(crate) mod store;

pub use cache::CacheStats;
