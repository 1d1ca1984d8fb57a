// ==============================================================================
// storage.rs - Durable Object Storage
// ==============================================================================
// Description: Object storage interface and a filesystem-backed implementation
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Object paths are '/'-separated keys relative to the store root, e.g.
//   SNP_Indv_Sanos/individual_csv_files/HG00096.csv
// ==============================================================================

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// The six operations the pipeline needs from durable storage
pub trait ObjectStore: Send + Sync {
    fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// Copy an object to a local file, creating parent directories
    fn download(&self, path: &str, local_dest: &Path) -> Result<(), StorageError>;

    /// Copy a local file to an object, replacing it
    fn upload(&self, local_src: &Path, path: &str) -> Result<(), StorageError>;

    fn read_text(&self, path: &str) -> Result<String, StorageError>;

    /// Replace an object's content
    fn write_text(&self, path: &str, content: &str) -> Result<(), StorageError>;

    /// Object paths starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Store handle shared between pipeline components
pub type SharedStore = Arc<dyn ObjectStore>;

/// Object store rooted at a local (or mounted) directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object key to a path under the root, rejecting escapes
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if key.is_empty() || !clean {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(self.root.join(relative))
    }

    fn existing(&self, key: &str) -> Result<PathBuf, StorageError> {
        let path = self.resolve(key)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(StorageError::NotFound(key.to_string()))
        }
    }

    /// Write through a sibling temp file and rename over the target
    fn write_atomic(target: &Path, content: &[u8]) -> Result<(), StorageError> {
        let parent = target
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(target.display().to_string()))?;
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;

        let mut staged = NamedTempFile::new_in(parent).map_err(|e| StorageError::io(parent, e))?;
        staged
            .write_all(content)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(|e| StorageError::io(target, e))?;
        staged
            .persist(target)
            .map_err(|e| StorageError::io(target, e.error))?;

        Ok(())
    }
}

impl ObjectStore for LocalObjectStore {
    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path)?.is_file())
    }

    fn download(&self, path: &str, local_dest: &Path) -> Result<(), StorageError> {
        let source = self.existing(path)?;
        if let Some(parent) = local_dest.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let bytes = fs::copy(&source, local_dest).map_err(|e| StorageError::io(local_dest, e))?;
        debug!("Downloaded {} ({} bytes) to {:?}", path, bytes, local_dest);
        Ok(())
    }

    fn upload(&self, local_src: &Path, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        let content = fs::read(local_src).map_err(|e| StorageError::io(local_src, e))?;
        Self::write_atomic(&target, &content)?;
        debug!("Uploaded {:?} ({} bytes) as {}", local_src, content.len(), path);
        Ok(())
    }

    fn read_text(&self, path: &str) -> Result<String, StorageError> {
        let source = self.existing(path)?;
        fs::read_to_string(&source).map_err(|e| StorageError::io(&source, e))
    }

    fn write_text(&self, path: &str, content: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        Self::write_atomic(&target, content.as_bytes())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // Walk only the deepest directory named by the prefix
        let base = match prefix.rfind('/') {
            Some(idx) => self.resolve(&prefix[..idx])?,
            None => self.root.clone(),
        };
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&base) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| base.clone());
                StorageError::io(path, std::io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}
