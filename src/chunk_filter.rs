// ==============================================================================
// chunk_filter.rs - Chromosome and Resume Cursor Filtering
// ==============================================================================
// Description: Restricts a chunk to canonical chromosomes past the checkpoint
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Ordering:
//   Rows are compared to the cursor chromosome-first, then by position.
//   Chromosome comparison is LEXICAL ("10" < "2"). Existing checkpoints were
//   written under this ordering, so it must not change without migrating them.
// ==============================================================================

use tracing::debug;

use crate::models::{Checkpoint, Cursor, VariantRow};

/// Chromosomes kept by the pipeline: 1-22, X, Y, MT
pub const CANONICAL_CHROMOSOMES: [&str; 25] = [
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "MT",
];

/// Normalise a chromosome name: trim, strip a case-insensitive "chr" prefix
pub fn normalize_chromosome(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("chr") => trimmed[3..].to_string(),
        _ => trimmed.to_string(),
    }
}

pub fn is_canonical_chromosome(chromosome: &str) -> bool {
    CANONICAL_CHROMOSOMES.contains(&chromosome)
}

impl Cursor {
    /// True if a row at `(chromosome, position)` sorts strictly after this
    /// cursor and so has not been processed yet
    pub fn admits(&self, chromosome: &str, position: u64) -> bool {
        chromosome > self.chromosome.as_str()
            || (chromosome == self.chromosome && position > self.position)
    }
}

/// Rows kept from a chunk plus drop counts for diagnostics
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub rows: Vec<VariantRow>,
    pub dropped_chromosome: usize,
    pub dropped_by_cursor: usize,
}

impl FilterOutcome {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Keep rows on canonical chromosomes that sort after the checkpoint cursor.
///
/// Chromosome names are normalised in place before both tests, so the cursor
/// is always compared against (and later saved from) the normalised form.
/// Row order is preserved.
pub fn filter_chunk(rows: Vec<VariantRow>, checkpoint: &Checkpoint) -> FilterOutcome {
    let cursor = checkpoint.cursor();
    let mut outcome = FilterOutcome::default();

    for mut row in rows {
        row.chromosome = normalize_chromosome(&row.chromosome);

        if !is_canonical_chromosome(&row.chromosome) {
            outcome.dropped_chromosome += 1;
            continue;
        }

        if let Some(cursor) = &cursor {
            if !cursor.admits(&row.chromosome, row.position) {
                outcome.dropped_by_cursor += 1;
                continue;
            }
        }

        outcome.rows.push(row);
    }

    debug!(
        "Chunk filter kept {} rows ({} non-canonical chromosome, {} already processed)",
        outcome.rows.len(),
        outcome.dropped_chromosome,
        outcome.dropped_by_cursor
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(chromosome: &str, position: u64) -> VariantRow {
        VariantRow {
            chromosome: chromosome.to_string(),
            position,
            id: ".".to_string(),
            ref_allele: "A".to_string(),
            alt_allele: "G".to_string(),
            genotypes: vec![Some("0|1".to_string())],
        }
    }

    fn kept(outcome: &FilterOutcome) -> Vec<(String, u64)> {
        outcome
            .rows
            .iter()
            .map(|r| (r.chromosome.clone(), r.position))
            .collect()
    }

    #[test]
    fn test_normalize_chromosome() {
        assert_eq!(normalize_chromosome("chrY"), "Y");
        assert_eq!(normalize_chromosome("  CHR7 "), "7");
        assert_eq!(normalize_chromosome("Chr22"), "22");
        assert_eq!(normalize_chromosome("MT"), "MT");
        assert_eq!(normalize_chromosome("12"), "12");
        assert_eq!(normalize_chromosome("ch"), "ch");
    }

    #[test]
    fn test_canonical_set() {
        assert!(is_canonical_chromosome("1"));
        assert!(is_canonical_chromosome("22"));
        assert!(is_canonical_chromosome("X"));
        assert!(is_canonical_chromosome("MT"));
        assert!(!is_canonical_chromosome("23"));
        assert!(!is_canonical_chromosome("M"));
        assert!(!is_canonical_chromosome("x"));
    }

    #[test]
    fn test_chr_prefix_passes_and_invalid_dropped() {
        let outcome = filter_chunk(vec![row("chrY", 10), row("26", 10)], &Checkpoint::null());
        assert_eq!(kept(&outcome), vec![("Y".to_string(), 10)]);
        assert_eq!(outcome.dropped_chromosome, 1);

        // "26" stays dropped no matter where the cursor sits
        let early = Checkpoint::from(Cursor::new("1", 0));
        let outcome = filter_chunk(vec![row("26", 10)], &early);
        assert!(outcome.is_empty());
        assert_eq!(outcome.dropped_chromosome, 1);
        assert_eq!(outcome.dropped_by_cursor, 0);
    }

    #[test]
    fn test_cursor_admits_only_later_rows() {
        let cursor = Cursor::new("7", 500);
        assert!(cursor.admits("7", 501));
        assert!(cursor.admits("8", 1));
        assert!(!cursor.admits("7", 500));
        assert!(!cursor.admits("7", 499));
        assert!(!cursor.admits("10", 1_000_000));
    }

    #[test]
    fn test_cursor_monotonicity() {
        let checkpoint = Checkpoint::from(Cursor::new("7", 500));
        let outcome = filter_chunk(
            vec![row("7", 499), row("7", 500), row("7", 501), row("chr7", 502)],
            &checkpoint,
        );

        assert_eq!(
            kept(&outcome),
            vec![("7".to_string(), 501), ("7".to_string(), 502)]
        );
        assert_eq!(outcome.dropped_by_cursor, 2);
        assert_eq!(outcome.rows.last().map(Cursor::of_row), Some(Cursor::new("7", 502)));
    }

    #[test]
    fn test_lexical_chromosome_order_is_preserved() {
        // "10" < "2" lexically, so chr10 counts as already processed once the
        // cursor reaches chr2
        let checkpoint = Checkpoint::from(Cursor::new("2", 100));
        let outcome = filter_chunk(vec![row("10", 5), row("3", 1), row("X", 1)], &checkpoint);

        assert_eq!(
            kept(&outcome),
            vec![("3".to_string(), 1), ("X".to_string(), 1)]
        );
    }

    #[test]
    fn test_null_cursor_keeps_all_canonical_rows_in_order() {
        let outcome = filter_chunk(
            vec![row("2", 5), row("1", 7), row("MT", 1)],
            &Checkpoint::null(),
        );
        assert_eq!(
            kept(&outcome),
            vec![
                ("2".to_string(), 5),
                ("1".to_string(), 7),
                ("MT".to_string(), 1)
            ]
        );
    }
}
