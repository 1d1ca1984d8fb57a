// ==============================================================================
// merge_sink.rs - Per-Individual Merge-Append Sink
// ==============================================================================
// Description: Appends a chunk's calls to an individual's persisted artifact
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use tracing::debug;

use crate::fanout::IndividualTable;
use crate::models::artifact_stem;
use crate::storage::SharedStore;

/// Writes per-individual artifacts under an output prefix
pub struct MergeAppendSink {
    store: SharedStore,
    output_prefix: String,
}

impl MergeAppendSink {
    pub fn new(store: SharedStore, output_prefix: impl Into<String>) -> Self {
        Self {
            store,
            output_prefix: output_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Artifact path for an individual: `{prefix}/{id truncated}.csv`
    pub fn artifact_path(&self, individual: &str) -> String {
        format!("{}/{}.csv", self.output_prefix, artifact_stem(individual))
    }

    /// Persist `previous rows + new rows` with a single header line.
    ///
    /// Callers must not append a chunk that the checkpoint already covers.
    pub fn append(&self, table: &IndividualTable) -> Result<()> {
        let path = self.artifact_path(&table.individual);

        let exists = self
            .store
            .exists(&path)
            .with_context(|| format!("Failed to check artifact {}", path))?;

        let existing = if exists {
            self.store
                .read_text(&path)
                .with_context(|| format!("Failed to read artifact {}", path))?
        } else {
            String::new()
        };

        // An empty leftover object has no header to reuse
        let merged = !existing.trim().is_empty();
        let content = if merged {
            let mut existing = existing;
            if !existing.ends_with('\n') {
                existing.push('\n');
            }
            existing.push_str(&table.to_csv(false)?);
            existing
        } else {
            table.to_csv(true)?
        };

        self.store
            .write_text(&path, &content)
            .with_context(|| format!("Failed to write artifact {}", path))?;

        debug!(
            "Appended {} calls for {} to {} ({})",
            table.calls.len(),
            table.individual,
            path,
            if merged { "merged" } else { "created" }
        );
        Ok(())
    }
}
