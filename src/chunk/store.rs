use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::foundation::core::ChunkKey;
use crate::foundation::error::{MimageError, MimageResult};

/// On-disk home of chunk artifacts: one PNG per chunk under a root directory.
#[derive(Clone, Debug)]
pub(crate) struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub(crate) fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn artifact_path(&self, key: ChunkKey) -> PathBuf {
        self.root.join(format!("{}.{}.png", key.x, key.y))
    }

    /// Persisted bytes for `key`, or `None` when the chunk was never written.
    pub(crate) fn read(&self, key: ChunkKey) -> MimageResult<Option<Vec<u8>>> {
        let path = self.artifact_path(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MimageError::io(path, e)),
        }
    }

    /// Replace the artifact for `key`. Readers never observe a half-written file.
    pub(crate) fn write(&self, key: ChunkKey, bytes: &[u8]) -> MimageResult<()> {
        let path = self.artifact_path(key);
        let tmp = path.with_extension("png.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| MimageError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            MimageError::io(&path, e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_encodes_signed_key() {
        let store = ChunkStore::new("/data");
        assert_eq!(
            store.artifact_path(ChunkKey::new(-1, 3)),
            PathBuf::from("/data/-1.3.png")
        );
    }

    #[test]
    fn missing_artifact_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        assert!(store.read(ChunkKey::new(0, 0)).unwrap().is_none());
    }

    #[test]
    fn write_then_read_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let key = ChunkKey::new(2, 5);
        store.write(key, b"abc").unwrap();
        store.write(key, b"defg").unwrap();
        assert_eq!(store.read(key).unwrap().as_deref(), Some(&b"defg"[..]));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["2.5.png".to_string()]);
    }

    #[test]
    fn unreadable_artifact_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChunkStore::new(dir.path());
        let key = ChunkKey::new(0, 0);
        // A directory in place of the artifact cannot be read as a file.
        std::fs::create_dir(store.artifact_path(key)).unwrap();
        assert!(matches!(store.read(key), Err(MimageError::Io { .. })));
    }
}
