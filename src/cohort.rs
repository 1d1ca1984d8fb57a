// ==============================================================================
// cohort.rs - Cohort Selection
// ==============================================================================
// Description: Builds the candidate individual list and applies the operator range
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Steps:
//   1. Read sample identifiers from the population table
//   2. Drop individuals named in the exclusion list (already processed)
//   3. Deduplicate, keeping first occurrence
//   4. Select the inclusive 1-based [start, end] range
// ==============================================================================

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use csv::ReaderBuilder;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CohortError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Population table has no '{0}' column")]
    MissingColumn(String),

    #[error(transparent)]
    Range(#[from] CohortRangeError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CohortRangeError {
    #[error("Invalid indices: start {start} must be at least 1")]
    StartBelowOne { start: usize },

    #[error("Invalid indices: end {end} exceeds the {available} available individuals")]
    EndOutOfRange { end: usize, available: usize },

    #[error("Invalid indices: start {start} is after end {end}")]
    Inverted { start: usize, end: usize },
}

/// Inclusive, 1-based selection over the candidate list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CohortRange {
    pub start: usize,
    pub end: usize,
}

impl CohortRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Slice of `individuals` covered by this range
    pub fn select<'a>(&self, individuals: &'a [String]) -> Result<&'a [String], CohortRangeError> {
        if self.start < 1 {
            return Err(CohortRangeError::StartBelowOne { start: self.start });
        }
        if self.end > individuals.len() {
            return Err(CohortRangeError::EndOutOfRange {
                end: self.end,
                available: individuals.len(),
            });
        }
        if self.start > self.end {
            return Err(CohortRangeError::Inverted {
                start: self.start,
                end: self.end,
            });
        }

        Ok(&individuals[self.start - 1..self.end])
    }
}

/// Individual name from one exclusion list line: last path segment without `.csv`
fn excluded_name(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let last = line.rsplit('/').next().unwrap_or(line);
    let name = last.strip_suffix(".csv").unwrap_or(last);
    (!name.is_empty()).then(|| name.to_string())
}

/// Parse an exclusion list (typically a listing of existing artifacts)
pub fn parse_exclusions(reader: impl BufRead) -> Result<HashSet<String>, CohortError> {
    let mut excluded = HashSet::new();
    for line in reader.lines() {
        if let Some(name) = excluded_name(&line?) {
            excluded.insert(name);
        }
    }
    Ok(excluded)
}

pub fn load_exclusions(path: impl AsRef<Path>) -> Result<HashSet<String>, CohortError> {
    parse_exclusions(BufReader::new(File::open(path.as_ref())?))
}

/// Sample identifiers from the named column of a population CSV
pub fn read_population(input: impl Read, column: &str) -> Result<Vec<String>, CohortError> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(input);

    let index = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| CohortError::MissingColumn(column.to_string()))?;

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(sample) = record.get(index).map(str::trim).filter(|s| !s.is_empty()) {
            samples.push(sample.to_string());
        }
    }
    Ok(samples)
}

/// Remove excluded individuals and duplicates, keeping first occurrence order
pub fn candidate_individuals(population: Vec<String>, excluded: &HashSet<String>) -> Vec<String> {
    let total = population.len();
    let mut seen = HashSet::new();
    let candidates: Vec<String> = population
        .into_iter()
        .filter(|s| !excluded.contains(s))
        .filter(|s| seen.insert(s.clone()))
        .collect();

    info!(
        "Individuals available: {} ({} after exclusions and deduplication)",
        total,
        candidates.len()
    );
    candidates
}
