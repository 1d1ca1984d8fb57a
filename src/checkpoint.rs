// ==============================================================================
// checkpoint.rs - Resumable Checkpoint Store
// ==============================================================================
// Description: Loads and persists the last fully processed (chromosome, position)
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Durability:
//   save() writes a local copy atomically, then uploads it. It must only be
//   called after every artifact for the chunk has been merged. A crash before
//   the upload replays that one chunk on restart; nothing earlier is replayed.
// ==============================================================================

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::Checkpoint;
use crate::storage::{SharedStore, StorageError};

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to write local checkpoint {path}: {source}")]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable checkpoint record with a local staging copy
pub struct CheckpointStore {
    store: SharedStore,
    remote_path: String,
    local_path: PathBuf,
}

impl CheckpointStore {
    pub fn new(store: SharedStore, remote_path: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            remote_path: remote_path.into(),
            local_path: local_path.into(),
        }
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Load the last durably saved checkpoint.
    ///
    /// Returns the null cursor when no record exists or the record is empty,
    /// unreadable or corrupt. Only failures to reach storage are errors.
    pub fn load(&self) -> Result<Checkpoint, CheckpointError> {
        if !self.store.exists(&self.remote_path)? {
            info!("Checkpoint {} not found, starting from the beginning", self.remote_path);
            return Ok(Checkpoint::null());
        }

        self.store.download(&self.remote_path, &self.local_path)?;
        Ok(read_checkpoint(&self.local_path))
    }

    /// Persist a checkpoint so that a later `load()` in a new process sees it
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        info!(
            "Saving checkpoint: chromosome {:?}, position {:?}",
            checkpoint.last_chromosome, checkpoint.last_position
        );

        let json = serde_json::to_string(checkpoint)?;
        self.write_local(json.as_bytes())?;
        self.store.upload(&self.local_path, &self.remote_path)?;

        Ok(())
    }

    fn write_local(&self, content: &[u8]) -> Result<(), CheckpointError> {
        let local_err = |source| CheckpointError::LocalWrite {
            path: self.local_path.clone(),
            source,
        };

        let parent = match self.local_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(local_err)?;

        let mut staged = NamedTempFile::new_in(&parent).map_err(local_err)?;
        staged
            .write_all(content)
            .and_then(|_| staged.as_file().sync_all())
            .map_err(local_err)?;
        staged.persist(&self.local_path).map_err(|e| local_err(e.error))?;

        Ok(())
    }

    /// Remove the local staging copy. Best-effort.
    pub fn remove_local_copy(&self) {
        remove_staged_file(&self.local_path);
    }
}

/// Parse a local checkpoint file, falling back to the null cursor
fn read_checkpoint(path: &Path) -> Checkpoint {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Checkpoint {:?} is unreadable ({}), starting from the beginning", path, e);
            return Checkpoint::null();
        }
    };

    if content.trim().is_empty() {
        info!("Checkpoint {:?} is empty, starting from the beginning", path);
        return Checkpoint::null();
    }

    match serde_json::from_str::<Checkpoint>(&content) {
        Ok(checkpoint) => {
            debug!("Loaded checkpoint {:?}", checkpoint);
            checkpoint
        }
        Err(e) => {
            warn!("Checkpoint {:?} is corrupt ({}), starting from the beginning", path, e);
            Checkpoint::null()
        }
    }
}

/// Delete a staged local file, logging instead of failing
pub fn remove_staged_file(path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => info!("Removed staged file {:?}", path),
        Err(e) => warn!("Failed to remove staged file {:?}: {}", path, e),
    }
}
