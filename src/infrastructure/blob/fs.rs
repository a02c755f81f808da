//! Filesystem blob store.
//!
//! Writes blobs under a root directory and hands back `file://` URLs. Keys
//! are slash-separated relative paths; path traversal components are
//! rejected before touching the filesystem.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::domain::{BlobError, BlobStore};

pub struct FsBlobStore {
    base_dir: PathBuf,
}

impl FsBlobStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || traversal {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, BlobError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| BlobError::Write {
                    key: key.to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| BlobError::Write {
                key: key.to_string(),
                source,
            })?;
        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| BlobError::Read {
                key: key.to_string(),
                source,
            })
    }
}
