// ==============================================================================
// driver.rs - Resumable Splitting Pipeline
// ==============================================================================
// Description: Streams the wide table in chunks and fans it out per individual
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// States:
//   INIT -> LOADING_CHECKPOINT -> STREAMING
//        -> per chunk: FILTERING -> WRITING -> CHECKPOINTING
//        -> DONE
// Every artifact of a chunk is merged before its checkpoint is saved.
// ==============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::checkpoint::{remove_staged_file, CheckpointStore};
use crate::chunk_filter::filter_chunk;
use crate::config::SplitConfig;
use crate::fanout::FanoutWriter;
use crate::merge_sink::MergeAppendSink;
use crate::models::{Checkpoint, Roster};
use crate::source_table::SourceTable;
use crate::storage::SharedStore;

/// Outcome of one splitting run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub chunks_read: usize,
    pub chunks_processed: usize,
    /// Chunks whose rows were all filtered out
    pub chunks_skipped: usize,
    /// Rows appended to each individual's artifact
    pub rows_written: u64,
    pub individuals: usize,
    pub checkpoint: Checkpoint,
    /// True when the run stopped early on request
    pub interrupted: bool,
}

/// Splitting pipeline over one object store
pub struct Driver {
    config: SplitConfig,
    store: SharedStore,
    stop: Arc<AtomicBool>,
}

impl Driver {
    pub fn new(config: SplitConfig, store: SharedStore) -> Self {
        Self {
            config,
            store,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a stop flag; the run ends at the next chunk boundary once set
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn run(&self) -> Result<RunSummary> {
        // INIT
        self.config.validate()?;
        let local_source = self.config.local_source_table()?;
        self.stage_source(&local_source)?;

        let mut table = SourceTable::open(&local_source, self.config.chunk_size)
            .with_context(|| format!("Failed to open source table {:?}", local_source))?;

        // LOADING_CHECKPOINT
        let checkpoints = CheckpointStore::new(
            self.store.clone(),
            self.config.checkpoint.clone(),
            self.config.local_checkpoint()?,
        );
        let mut checkpoint = checkpoints
            .load()
            .with_context(|| format!("Failed to load checkpoint {}", self.config.checkpoint))?;
        match checkpoint.cursor() {
            Some(cursor) => info!(
                "Resuming after chromosome {} position {}",
                cursor.chromosome, cursor.position
            ),
            None => info!("No checkpoint cursor, processing from the start"),
        }

        let sink = MergeAppendSink::new(self.store.clone(), self.config.output_prefix.clone());
        let mut roster: Option<Roster> = None;
        let mut summary = RunSummary::default();

        // STREAMING
        loop {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Stop requested, ending run at chunk boundary");
                summary.interrupted = true;
                break;
            }

            let chunk = match table.next_chunk().context("Failed to read source chunk")? {
                Some(chunk) => chunk,
                None => break,
            };
            summary.chunks_read += 1;
            info!(
                "Chunk {}: {} rows read, {} parsed",
                chunk.index,
                chunk.rows_read,
                chunk.rows.len()
            );

            if roster.is_none() && !chunk.rows.is_empty() {
                let derived = Roster::from_header(table.header());
                info!("Detected {} individuals", derived.len());
                if derived.is_empty() {
                    warn!("No individual columns qualify, nothing will be written");
                }
                roster = Some(derived);
            }

            // FILTERING
            let outcome = filter_chunk(chunk.rows, &checkpoint);
            debug!(
                "Chunk {}: {} kept, {} non-canonical, {} before cursor",
                chunk.index,
                outcome.rows.len(),
                outcome.dropped_chromosome,
                outcome.dropped_by_cursor
            );

            let writer = match roster.as_ref() {
                Some(roster) if !outcome.is_empty() => FanoutWriter::new(&outcome.rows, roster),
                _ => {
                    info!("Chunk {}: no rows left after filtering, skipping", chunk.index);
                    summary.chunks_skipped += 1;
                    continue;
                }
            };
            let Some(cursor) = writer.chunk_cursor() else {
                continue;
            };

            // WRITING
            for individual in writer.tables() {
                sink.append(&individual).with_context(|| {
                    format!(
                        "Failed to persist chunk {} for {}",
                        chunk.index, individual.individual
                    )
                })?;
            }

            // CHECKPOINTING
            checkpoint.advance_to(&cursor);
            checkpoints
                .save(&checkpoint)
                .with_context(|| format!("Failed to save checkpoint after chunk {}", chunk.index))?;

            summary.chunks_processed += 1;
            if writer.individuals() > 0 {
                summary.rows_written += outcome.rows.len() as u64;
            }
            info!(
                "Chunk {}: {} rows written for {} individuals, checkpoint at {} {}",
                chunk.index,
                outcome.rows.len(),
                writer.individuals(),
                cursor.chromosome,
                cursor.position
            );
        }

        // DONE
        summary.individuals = roster.as_ref().map_or(0, Roster::len);
        summary.checkpoint = checkpoint;

        remove_staged_file(&local_source);
        checkpoints.remove_local_copy();

        info!(
            "Run finished: {} chunks read, {} processed, {} skipped, {} rows per individual{}",
            summary.chunks_read,
            summary.chunks_processed,
            summary.chunks_skipped,
            summary.rows_written,
            if summary.interrupted { " (interrupted)" } else { "" }
        );
        Ok(summary)
    }

    /// Download the source table unless a local copy is already staged
    fn stage_source(&self, local: &std::path::Path) -> Result<()> {
        if local.exists() {
            info!("Using staged source table {:?}", local);
            return Ok(());
        }

        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        info!("Downloading {} to {:?}", self.config.source_table, local);
        self.store
            .download(&self.config.source_table, local)
            .with_context(|| format!("Failed to stage source table {}", self.config.source_table))?;
        Ok(())
    }
}
