use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::foundation::core::PixelRect;
use crate::foundation::error::{MimageError, MimageResult};

/// Name of the metadata file inside an image directory.
pub const METADATA_FILE: &str = ".mimage_metadata.json";

/// Default side of a chunk in pixels.
pub const DEFAULT_CHUNK_SIZE: u32 = 500;

/// Default number of worker threads per operation.
pub const DEFAULT_WORKERS: usize = 4;

/// Options for [`crate::Mimage::create`].
#[derive(Clone, Debug)]
pub struct MimageOpts {
    /// Side of a square chunk in pixels, `1..=65535`.
    pub chunk_size: u32,
    /// Where chunk artifacts live. `None` picks a fresh directory under the system temp dir.
    ///
    /// A missing directory is created. An existing directory must not already hold an image.
    pub directory: Option<PathBuf>,
    /// Worker threads per operation; `0` is treated as `1`.
    pub workers: usize,
    /// In-memory cache behaviour.
    pub cache: CacheOpts,
}

impl Default for MimageOpts {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            directory: None,
            workers: DEFAULT_WORKERS,
            cache: CacheOpts::default(),
        }
    }
}

impl MimageOpts {
    pub(crate) fn validated_chunk_size(&self) -> MimageResult<u16> {
        validate_chunk_size(self.chunk_size)
    }
}

/// Cache behaviour. Not persisted; supplied again when an image is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheOpts {
    /// How often the evictor revisits every chunk to unload the idle ones.
    pub evict_interval: Duration,
}

impl Default for CacheOpts {
    fn default() -> Self {
        Self {
            evict_interval: Duration::from_secs(1),
        }
    }
}

fn validate_chunk_size(size: u32) -> MimageResult<u16> {
    u16::try_from(size)
        .ok()
        .filter(|&s| s > 0)
        .ok_or_else(|| {
            MimageError::validation(format!("chunk size must be in 1..=65535, got {size}"))
        })
}

/// Persisted description of an image, stored as JSON next to the chunk artifacts.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Metadata {
    pub(crate) bounds_min_x: i64,
    pub(crate) bounds_min_y: i64,
    pub(crate) bounds_max_x: i64,
    pub(crate) bounds_max_y: i64,
    pub(crate) chunk_size: u32,
    #[serde(rename = "Routines")]
    pub(crate) workers: usize,
}

impl Metadata {
    pub(crate) fn new(bounds: PixelRect, chunk_size: u16, workers: usize) -> Self {
        Self {
            bounds_min_x: bounds.min_x,
            bounds_min_y: bounds.min_y,
            bounds_max_x: bounds.max_x,
            bounds_max_y: bounds.max_y,
            chunk_size: u32::from(chunk_size),
            workers,
        }
    }

    pub(crate) fn bounds(&self) -> PixelRect {
        PixelRect::new(
            self.bounds_min_x,
            self.bounds_min_y,
            self.bounds_max_x,
            self.bounds_max_y,
        )
    }

    pub(crate) fn path(dir: &Path) -> PathBuf {
        dir.join(METADATA_FILE)
    }

    pub(crate) fn write(&self, dir: &Path) -> MimageResult<()> {
        let path = Self::path(dir);
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| MimageError::metadata(format!("serialize metadata: {e}")))?;
        std::fs::write(&path, json).map_err(|e| MimageError::io(path, e))
    }

    /// Read and validate the metadata stored in `dir`.
    pub(crate) fn read(dir: &Path) -> MimageResult<Self> {
        let path = Self::path(dir);
        let meta = std::fs::metadata(&path).map_err(|e| MimageError::io(&path, e))?;
        if !meta.is_file() {
            return Err(MimageError::metadata(format!(
                "{} is not a file",
                path.display()
            )));
        }
        let bytes = std::fs::read(&path).map_err(|e| MimageError::io(&path, e))?;
        let parsed: Self = serde_json::from_slice(&bytes)
            .map_err(|e| MimageError::metadata(format!("parse {}: {e}", path.display())))?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub(crate) fn chunk_size_u16(&self) -> MimageResult<u16> {
        validate_chunk_size(self.chunk_size)
            .map_err(|_| MimageError::metadata(format!("invalid chunk size {}", self.chunk_size)))
    }

    fn validate(&self) -> MimageResult<()> {
        if self.bounds().is_empty() {
            return Err(MimageError::metadata(format!(
                "image bounds are empty: {:?}",
                self.bounds()
            )));
        }
        self.chunk_size_u16().map(|_| ())
    }
}

/// Resolve the directory a new image lives in, creating it when missing.
pub(crate) fn prepare_directory(requested: Option<&Path>) -> MimageResult<PathBuf> {
    let dir = match requested {
        Some(dir) => dir.to_path_buf(),
        None => fresh_temp_dir(),
    };
    if dir.exists() {
        if !dir.is_dir() {
            return Err(MimageError::validation(format!(
                "{} exists and is not a directory",
                dir.display()
            )));
        }
        if Metadata::path(&dir).exists() {
            return Err(MimageError::validation(format!(
                "{} already contains an image",
                dir.display()
            )));
        }
    } else {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create image directory {}", dir.display()))?;
    }
    Ok(dir)
}

fn fresh_temp_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join(format!("mimage_{}_{nanos}", std::process::id()))
}
