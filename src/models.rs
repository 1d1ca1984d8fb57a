// ==============================================================================
// models.rs - Cohort Splitting Data Models
// ==============================================================================
// Description: Data structures shared by the extraction and splitting stages
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};

/// Leading metadata columns of the wide source table and of every
/// per-individual artifact.
pub const METADATA_COLUMNS: [&str; 5] = ["CHROM", "POS", "ID", "REF", "ALT"];

/// Identifiers must be strictly shorter than this to join the roster.
/// Artifact filenames are truncated to the same length.
pub const MAX_INDIVIDUAL_ID_LEN: usize = 10;

/// One variant row of the wide source table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRow {
    /// Chromosome as read (normalised by the chunk filter)
    pub chromosome: String,

    /// Base pair position
    pub position: u64,

    /// Variant identifier (rsID or ".")
    pub id: String,

    /// Reference allele
    pub ref_allele: String,

    /// Alternate allele
    pub alt_allele: String,

    /// Raw genotype tokens, one per individual column of the source header.
    /// `None` means the cell was empty or absent.
    pub genotypes: Vec<Option<String>>,
}

/// Decoded, individual-specific call written to an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCall {
    #[serde(rename = "CHROM")]
    pub chromosome: String,

    #[serde(rename = "POS")]
    pub position: u64,

    #[serde(rename = "ID")]
    pub id: String,

    /// First resolved allele (literal bases)
    #[serde(rename = "REF")]
    pub allele_a: String,

    /// Second resolved allele (literal bases)
    #[serde(rename = "ALT")]
    pub allele_b: String,
}

/// Position of the last durably processed row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub chromosome: String,
    pub position: u64,
}

impl Cursor {
    pub fn new(chromosome: impl Into<String>, position: u64) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
        }
    }

    pub fn of_row(row: &VariantRow) -> Self {
        Self::new(row.chromosome.clone(), row.position)
    }
}

/// Persisted resume record.
///
/// Older checkpoint files used `last_chrom` / `last_pos`; both spellings are
/// accepted on load, only the long form is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default, alias = "last_chrom")]
    pub last_chromosome: Option<String>,

    #[serde(default, alias = "last_pos")]
    pub last_position: Option<u64>,
}

impl Checkpoint {
    /// The null cursor: process everything
    pub fn null() -> Self {
        Self::default()
    }

    /// Active cursor, only when both fields are set
    pub fn cursor(&self) -> Option<Cursor> {
        match (&self.last_chromosome, self.last_position) {
            (Some(chromosome), Some(position)) => Some(Cursor::new(chromosome.clone(), position)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.cursor().is_none()
    }

    pub fn advance_to(&mut self, cursor: &Cursor) {
        self.last_chromosome = Some(cursor.chromosome.clone());
        self.last_position = Some(cursor.position);
    }
}

impl From<Cursor> for Checkpoint {
    fn from(cursor: Cursor) -> Self {
        Self {
            last_chromosome: Some(cursor.chromosome),
            last_position: Some(cursor.position),
        }
    }
}

/// Roster member: identifier plus its index into `VariantRow::genotypes`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: String,
    pub column: usize,
}

/// Ordered individuals processed by a run, frozen once derived
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Derive the roster from a full source header (metadata columns first).
    ///
    /// Columns past the metadata block whose identifier is shorter than
    /// [`MAX_INDIVIDUAL_ID_LEN`] characters are kept, in header order.
    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Self {
        let entries = header
            .iter()
            .skip(METADATA_COLUMNS.len())
            .enumerate()
            .filter(|(_, name)| name.as_ref().chars().count() < MAX_INDIVIDUAL_ID_LEN)
            .map(|(column, name)| RosterEntry {
                id: name.as_ref().to_string(),
                column,
            })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Filename stem of an individual's artifact
pub fn artifact_stem(individual: &str) -> String {
    individual.chars().take(MAX_INDIVIDUAL_ID_LEN).collect()
}
