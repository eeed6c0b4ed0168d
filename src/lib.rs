//! `mimage` draws on images far larger than memory.
//!
//! The canvas is split into square chunks stored as PNG files in a directory. Drawing calls are
//! batched into an [`Operation`], which works out the chunks its bounding box touches, loads only
//! those, and replays the batch against each of them in parallel. Idle chunks are written back and
//! dropped by a background evictor.
//!
//! - Create or open a [`Mimage`]
//! - Queue drawing calls on [`Mimage::draw`] and run them with [`Operation::execute`]
//! - Read pixels back with [`Mimage::read_region`] or [`Mimage::pixel_at`]
//! - [`Mimage::close`] to persist everything
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chunk;
mod config;
mod foundation;
mod grid;
mod handle;
mod operation;
mod raster;

pub use crate::chunk::CacheStats;
pub use crate::config::{
    CacheOpts, DEFAULT_CHUNK_SIZE, DEFAULT_WORKERS, METADATA_FILE, MimageOpts,
};
pub use crate::foundation::core::{ChunkKey, PixelRect, Rgba8};
pub use crate::foundation::error::{ChunkFailure, MimageError, MimageResult, OperationError};
pub use crate::grid::{ChunkGrid, ChunksWithin};
pub use crate::handle::Mimage;
pub use crate::operation::Operation;
pub use crate::raster::pattern::{LinearGradient, Pattern, RadialGradient, SolidPattern};
