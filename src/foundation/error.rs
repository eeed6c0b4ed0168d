use std::fmt;
use std::path::PathBuf;

use crate::foundation::core::ChunkKey;

/// Convenience result type used across the crate.
pub type MimageResult<T> = Result<T, MimageError>;

/// Top-level error type returned by `mimage` APIs.
#[derive(thiserror::Error, Debug)]
pub enum MimageError {
    /// Invalid options, rectangles or queued drawing arguments.
    #[error("validation error: {0}")]
    Validation(String),

    /// Filesystem failure while touching `path`.
    #[error("io error at {}: {source}", .path.display())]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A persisted chunk artifact exists but is not a decodable image.
    #[error("chunk {key} could not be decoded: {source}")]
    Decode {
        /// Chunk whose artifact failed to decode.
        key: ChunkKey,
        /// Underlying codec error.
        #[source]
        source: image::ImageError,
    },

    /// A chunk canvas could not be encoded for persistence.
    #[error("chunk {key} could not be encoded: {source}")]
    Encode {
        /// Chunk being persisted.
        key: ChunkKey,
        /// Underlying codec error.
        #[source]
        source: image::ImageError,
    },

    /// Persisted image metadata is missing or malformed.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// One or more chunks failed while an operation was executed.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),

    /// Context-wrapped failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MimageError {
    /// Construct a [`MimageError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Construct a [`MimageError::Metadata`].
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Construct a [`MimageError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A single chunk that failed during an operation.
#[derive(Debug)]
pub struct ChunkFailure {
    /// Chunk that failed.
    pub key: ChunkKey,
    /// Why it failed.
    pub error: MimageError,
}

/// Aggregate of every per-chunk failure of one operation.
///
/// Sibling chunks keep running when one chunk fails, so a failed operation may still have mutated
/// every chunk not listed here.
#[derive(Debug)]
pub struct OperationError {
    failures: Vec<ChunkFailure>,
}

impl OperationError {
    pub(crate) fn new(mut failures: Vec<ChunkFailure>) -> Self {
        failures.sort_by_key(|f| f.key);
        Self { failures }
    }

    /// Failures ordered by chunk key.
    pub fn failures(&self) -> &[ChunkFailure] {
        &self.failures
    }

    /// Keys of the failed chunks, ordered.
    pub fn keys(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.failures.iter().map(|f| f.key)
    }

    /// Number of failed chunks.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always `false` for errors produced by the crate.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation failed on {} chunk(s)", self.failures.len())?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{} {}", failure.key, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            MimageError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            MimageError::metadata("x")
                .to_string()
                .contains("metadata error:")
        );
        assert!(
            MimageError::internal("x")
                .to_string()
                .contains("internal error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = MimageError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn operation_error_lists_every_chunk() {
        let err = OperationError::new(vec![
            ChunkFailure {
                key: ChunkKey::new(1, 0),
                error: MimageError::validation("second"),
            },
            ChunkFailure {
                key: ChunkKey::new(0, 0),
                error: MimageError::validation("first"),
            },
        ]);
        assert_eq!(err.len(), 2);
        assert_eq!(
            err.keys().collect::<Vec<_>>(),
            vec![ChunkKey::new(0, 0), ChunkKey::new(1, 0)]
        );
        let msg = MimageError::from(err).to_string();
        assert!(msg.starts_with("operation failed on 2 chunk(s)"));
        assert!(msg.find("first").unwrap() < msg.find("second").unwrap());
    }
}
