//! Flat, filename-addressable store for uploaded file bytes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Uploaded-bytes backend.
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Write `bytes` under `name`, replacing any existing content.
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Local path holding `name`, or `None` when nothing is stored.
    async fn read_path(&self, name: &str) -> Result<Option<PathBuf>>;

    /// Remove `name`. Returns `false` when nothing was stored.
    async fn delete(&self, name: &str) -> Result<bool>;
}

/// Returns `true` if `name` can be used as a flat byte-store key.
///
/// Rejects empty names, path separators, and `.`/`..`.
pub fn is_valid_filename(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// [`ByteStore`] backed by one directory on the local filesystem.
pub struct FsByteStore {
    root: PathBuf,
}

impl FsByteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if !is_valid_filename(name) {
            anyhow::bail!("invalid byte-store filename: '{}'", name);
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ByteStore for FsByteStore {
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    async fn read_path(&self, name: &str) -> Result<Option<PathBuf>> {
        let path = self.path_for(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
        }
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}
