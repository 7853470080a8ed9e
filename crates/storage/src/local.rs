//! Filesystem-backed [`BlobStore`].
//!
//! Keys map to paths under a root directory. Writes go to a sibling
//! temporary file first and are renamed into place, so readers never
//! observe a partially written blob.

use std::path::PathBuf;

use adgen_core::services::{BlobStore, StorageError};
use adgen_core::storage::validate_storage_key;
use async_trait::async_trait;

/// Suffix for in-progress writes.
const PARTIAL_SUFFIX: &str = ".partial";

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    /// Prefix for download URLs. When absent, `file://` URLs are produced.
    public_base_url: Option<String>,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_storage_key(key).map_err(|e| StorageError::InvalidKey(e.to_string()))?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(format!("create {}: {e}", parent.display())))?;
        }

        let partial = path.with_extension(match path.extension() {
            Some(ext) => format!("{}{PARTIAL_SUFFIX}", ext.to_string_lossy()),
            None => PARTIAL_SUFFIX.trim_start_matches('.').to_string(),
        });
        let size = bytes.len();
        tokio::fs::write(&partial, bytes)
            .await
            .map_err(|e| StorageError::Io(format!("write {}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| StorageError::Io(format!("rename into {}: {e}", path.display())))?;

        tracing::debug!(key, content_type, size, "Blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Io(format!("read {}: {e}", path.display()))),
        }
    }

    fn public_url(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("file://{}", self.root.join(key).display()),
        }
    }
}
