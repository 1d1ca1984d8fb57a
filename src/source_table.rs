// ==============================================================================
// source_table.rs - Chunked Wide Table Reader
// ==============================================================================
// Description: Streams the wide genotype table in fixed-size row chunks
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Format: CSV with header, optionally gzip-compressed (.gz)
// Example:
//   CHROM,POS,ID,REF,ALT,HG00096,HG00097
//   1,10177,rs367896724,A,AC,1|0,0|1
//   chrX,60020,rs1,T,G,0|0,
// ==============================================================================

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{VariantRow, METADATA_COLUMNS};

#[derive(Error, Debug)]
pub enum SourceTableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid header: expected column {index} to be '{expected}', found '{found}'")]
    InvalidHeader {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("Chunk size must be at least 1")]
    InvalidChunkSize,
}

/// A bounded batch of rows from one pull
#[derive(Debug)]
pub struct Chunk {
    /// Zero-based chunk number
    pub index: usize,

    /// Rows that parsed cleanly, in file order
    pub rows: Vec<VariantRow>,

    /// Rows pulled from the file, including malformed ones
    pub rows_read: usize,
}

/// Chunked reader over the wide source table
pub struct SourceTable {
    reader: csv::Reader<Box<dyn Read + Send>>,
    header: Vec<String>,
    chunk_size: usize,
    next_index: usize,
    line: u64,
}

impl SourceTable {
    /// Open a source table, reading and validating its header
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self, SourceTableError> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let input: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
            Box::new(MultiGzDecoder::new(BufReader::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        Self::from_reader(input, chunk_size)
    }

    pub fn from_reader(input: Box<dyn Read + Send>, chunk_size: usize) -> Result<Self, SourceTableError> {
        if chunk_size == 0 {
            return Err(SourceTableError::InvalidChunkSize);
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let header: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        for (index, expected) in METADATA_COLUMNS.iter().enumerate() {
            let found = header.get(index).map(String::as_str).unwrap_or("");
            if found != *expected {
                return Err(SourceTableError::InvalidHeader {
                    index,
                    expected,
                    found: found.to_string(),
                });
            }
        }

        debug!(
            "Opened source table with {} individual columns",
            header.len() - METADATA_COLUMNS.len()
        );

        Ok(Self {
            reader,
            header,
            chunk_size,
            next_index: 0,
            line: 1,
        })
    }

    /// Full header, metadata columns first
    pub fn header(&self) -> &[String] {
        &self.header
    }

    fn individual_count(&self) -> usize {
        self.header.len() - METADATA_COLUMNS.len()
    }

    /// Pull the next chunk of up to `chunk_size` rows; `None` at end of input
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, SourceTableError> {
        let mut rows = Vec::with_capacity(self.chunk_size.min(64 * 1024));
        let mut rows_read = 0;
        let mut record = StringRecord::new();

        while rows_read < self.chunk_size {
            match self.reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    // Undecodable row: count it against the chunk and move on
                    self.line += 1;
                    rows_read += 1;
                    warn!("Skipping unreadable source row near line {}: {}", self.line, e);
                    continue;
                }
            }

            self.line += 1;
            rows_read += 1;
            if let Some(row) = self.parse_row(&record) {
                rows.push(row);
            }
        }

        if rows_read == 0 {
            return Ok(None);
        }

        let chunk = Chunk {
            index: self.next_index,
            rows,
            rows_read,
        };
        self.next_index += 1;
        Ok(Some(chunk))
    }

    /// Convert one record, or `None` with a warning if metadata is unusable
    fn parse_row(&self, record: &StringRecord) -> Option<VariantRow> {
        if record.len() < METADATA_COLUMNS.len() {
            warn!(
                "Skipping source row at line {}: expected at least {} fields, found {}",
                self.line,
                METADATA_COLUMNS.len(),
                record.len()
            );
            return None;
        }

        let position_str = record[1].trim();
        let position = match position_str.parse::<u64>() {
            Ok(position) => position,
            Err(_) => {
                warn!(
                    "Skipping source row at line {}: invalid position '{}'",
                    self.line, position_str
                );
                return None;
            }
        };

        let genotypes = (0..self.individual_count())
            .map(|i| {
                // Tokens are kept verbatim; only an empty cell is missing
                record
                    .get(METADATA_COLUMNS.len() + i)
                    .filter(|token| !token.is_empty())
                    .map(str::to_string)
            })
            .collect();

        Some(VariantRow {
            chromosome: record[0].to_string(),
            position,
            id: record[2].trim().to_string(),
            ref_allele: record[3].trim().to_string(),
            alt_allele: record[4].trim().to_string(),
            genotypes,
        })
    }
}
