//! Object storage for certificates and profile pictures.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppError;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `path` and returns a URL that serves them.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, AppError>;
}

/// Rejects absolute paths and `..` so uploads stay under the storage root.
fn checked_path(path: &str) -> Result<&Path, AppError> {
    let candidate = Path::new(path);
    let safe = !path.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(candidate)
    } else {
        Err(AppError::validation(format!("Invalid upload path: {}", path)))
    }
}

/// Writes uploads to a local directory that the router serves under
/// `/uploads`.
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let relative = checked_path(path)?;
        let target = self.root.join(relative);

        let io_err = |e: std::io::Error| AppError::RemoteUnavailable(format!("upload failed: {}", e));
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&target, &bytes).await.map_err(io_err)?;

        tracing::debug!(
            "Stored {} bytes ({}) at {}",
            bytes.len(),
            content_type,
            target.display()
        );
        Ok(format!("{}/uploads/{}", self.public_base_url, path))
    }
}

/// Keeps uploads in memory; used by tests.
#[derive(Default)]
pub struct MemoryObjectStorage {
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, path: &str) -> Option<(String, Vec<u8>)> {
        self.objects.read().await.get(path).cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        checked_path(path)?;
        self.objects
            .write()
            .await
            .insert(path.to_string(), (content_type.to_string(), bytes));
        Ok(format!("memory://{}", path))
    }
}
