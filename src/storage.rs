//! Artifact storage rooted at the run's output directory.
//!
//! All paths passed in are relative to the root. Presence of a file is the
//! authoritative record that a pipeline step already happened.

use crate::error::{Result, VideoError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Whether a non-empty artifact exists at `path`.
    async fn exists(&self, path: &Path) -> bool;

    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Store `data`, replacing whatever was there.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    async fn append_line(&self, path: &Path, line: &str) -> Result<()>;

    /// Delete `path`; deleting something absent is not an error.
    async fn remove(&self, path: &Path) -> Result<()>;

    /// File names directly inside `dir`.
    async fn list(&self, dir: &Path) -> Result<Vec<String>>;

    /// Location usable by external tools.
    fn resolve(&self, path: &Path) -> PathBuf;
}

/// Store backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn ensure_parent(&self, full: &Path) -> Result<()> {
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(path)).await?)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        self.ensure_parent(&full).await?;

        // a half-written file must never look like a finished artifact
        let mut partial = full.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        tokio::fs::write(&partial, data).await?;
        tokio::fs::rename(&partial, &full).await?;
        Ok(())
    }

    async fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let full = self.resolve(path);
        self.ensure_parent(&full).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(self.resolve(path)).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn list(&self, dir: &Path) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.resolve(dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

/// In-memory store, handy where no real files are needed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.lock().insert(path.into(), data.into());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().get(path.as_ref()).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        // a poisoned map is still a consistent map
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn exists(&self, path: &Path) -> bool {
        self.lock().get(path).is_some_and(|data| !data.is_empty())
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.get(path).ok_or_else(|| {
            VideoError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            ))
        })
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.insert(path, data);
        Ok(())
    }

    async fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let mut files = self.lock();
        let file = files.entry(path.to_path_buf()).or_default();
        file.extend_from_slice(line.as_bytes());
        file.push(b'\n');
        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        self.lock().remove(path);
        Ok(())
    }

    async fn list(&self, dir: &Path) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}
