use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub is_file: bool,
    pub modified: Option<SystemTime>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn write(&self, path: &Path, content: &[u8]) -> Result<()>;
    async fn exists(&self, path: &Path) -> Result<bool>;
    async fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// Immediate children of `dir`, in directory-listing order.
    async fn list(&self, dir: &Path) -> Result<Vec<FileEntry>>;
}

pub struct NativeStorage;

impl NativeStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NativeStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn write(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn list(&self, dir: &Path) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        if !tokio::fs::try_exists(dir).await? {
            return Ok(entries);
        }

        let mut read_dir = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Skipping unreadable entry {:?}: {}", entry.path(), e);
                    continue;
                }
            };
            entries.push(FileEntry {
                path: entry.path(),
                is_file: metadata.is_file(),
                modified: metadata.modified().ok(),
            });
        }
        Ok(entries)
    }
}
