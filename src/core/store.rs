// src/core/store.rs

//! Streams blobs in and out of the on-disk layout derived by `PathTransform`.
//! Grounded on `original_source/internal/file/file.go`'s `File` type:
//! buffered-writer-then-sync writes, stat-based existence checks, and
//! walk-up-and-prune deletes.

use crate::core::errors::NodeError;
use crate::core::path::PathTransform;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// Local persistence for blobs. Owns a base directory and a path transform;
/// every operation is scoped to a single key.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base: PathBuf,
    transform: PathTransform,
}

impl BlobStore {
    pub fn new(base: impl Into<PathBuf>, transform: PathTransform) -> Self {
        Self {
            base: base.into(),
            transform,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.transform.full_path(&self.base, key)
    }

    /// Creates intermediate directories, writes `data` through a buffered
    /// writer, flushes and syncs, and returns the number of bytes written.
    /// Never leaves a partially written file visible on success.
    pub async fn write(&self, key: &str, data: &[u8]) -> Result<u64, NodeError> {
        let target = self.path_for(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(DIR_MODE);
                let _ = fs::set_permissions(parent, perms).await;
            }
        }

        let tmp = target.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.flush().await?;
            file.sync_all().await?;
        }
        fs::rename(&tmp, &target).await?;

        debug!(key, bytes = data.len(), path = %target.display(), "wrote blob");
        Ok(data.len() as u64)
    }

    /// Reads a key's blob entirely into memory.
    pub async fn read(&self, key: &str) -> Result<Bytes, NodeError> {
        let target = self.path_for(key);
        match fs::read(&target).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(NodeError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes a key's blob and walks up pruning now-empty parent
    /// directories, stopping at the base directory or the first
    /// non-empty/inaccessible ancestor. The base directory is never removed.
    pub async fn delete(&self, key: &str) -> Result<(), NodeError> {
        let target = self.path_for(key);
        match fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(NodeError::NotFound),
            Err(e) => return Err(e.into()),
        }

        let mut dir = target.parent().map(Path::to_path_buf);
        while let Some(d) = dir {
            if d == self.base || !d.starts_with(&self.base) {
                break;
            }
            match fs::remove_dir(&d).await {
                Ok(()) => dir = d.parent().map(Path::to_path_buf),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    dir = d.parent().map(Path::to_path_buf);
                }
                Err(_) => {
                    // Non-empty or permission denied: stop climbing.
                    break;
                }
            }
        }
        debug!(key, path = %target.display(), "deleted blob");
        Ok(())
    }

    /// Stat-based existence check. All errors (including permission denied)
    /// are suppressed to `false`.
    pub async fn exists(&self, key: &str) -> bool {
        fs::metadata(self.path_for(key)).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathTransformKind;
    use tempfile::tempdir;

    fn store(dir: &Path, kind: PathTransformKind) -> BlobStore {
        BlobStore::new(dir, PathTransform::from_kind(kind))
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), PathTransformKind::ContentAddressable);
        let size = store.write("hello", b"world").await.unwrap();
        assert_eq!(size, 5);
        let read_back = store.read("hello").await.unwrap();
        assert_eq!(&read_back[..], b"world");
    }

    #[tokio::test]
    async fn read_missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), PathTransformKind::ContentAddressable);
        assert!(matches!(store.read("missing").await, Err(NodeError::NotFound)));
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_reports_not_found_on_second_call() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), PathTransformKind::ContentAddressable);
        store.write("k", b"v").await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await);
        assert!(matches!(store.delete("k").await, Err(NodeError::NotFound)));
    }

    #[tokio::test]
    async fn delete_prunes_empty_intermediate_directories_but_keeps_base() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), PathTransformKind::ContentAddressable);
        store.write("lonely", b"data").await.unwrap();
        store.delete("lonely").await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn identity_transform_round_trips_under_key_key() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), PathTransformKind::Identity);
        store.write("plain", b"payload").await.unwrap();
        assert!(dir.path().join("plain").join("plain").exists());
        assert_eq!(&store.read("plain").await.unwrap()[..], b"payload");
    }
}
