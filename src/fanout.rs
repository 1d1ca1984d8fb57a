// ==============================================================================
// fanout.rs - Per-Individual Fan-out
// ==============================================================================
// Description: Splits a filtered chunk into one resolved call table per individual
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use csv::WriterBuilder;
use thiserror::Error;

use crate::genotype_converter::decode_genotype;
use crate::models::{Cursor, ResolvedCall, Roster, RosterEntry, VariantRow, METADATA_COLUMNS};

#[derive(Error, Debug)]
pub enum FanoutError {
    #[error("CSV writing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to flush CSV buffer: {0}")]
    Flush(String),
}

/// Resolved calls of one individual for one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndividualTable {
    pub individual: String,
    pub calls: Vec<ResolvedCall>,
}

impl IndividualTable {
    /// Render as CSV, optionally preceded by the `CHROM,POS,ID,REF,ALT` header
    pub fn to_csv(&self, with_header: bool) -> Result<String, FanoutError> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::with_capacity(self.calls.len() * 32));

        if with_header {
            writer.write_record(METADATA_COLUMNS)?;
        }
        for call in &self.calls {
            writer.serialize(call)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| FanoutError::Flush(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| FanoutError::Flush(e.to_string()))
    }
}

/// Fans a filtered chunk out to the individuals of a frozen roster
pub struct FanoutWriter<'a> {
    rows: &'a [VariantRow],
    roster: &'a Roster,
}

impl<'a> FanoutWriter<'a> {
    pub fn new(rows: &'a [VariantRow], roster: &'a Roster) -> Self {
        Self { rows, roster }
    }

    /// Cursor the checkpoint moves to once every table has been persisted
    pub fn chunk_cursor(&self) -> Option<Cursor> {
        self.rows.last().map(Cursor::of_row)
    }

    pub fn individuals(&self) -> usize {
        self.roster.len()
    }

    /// Tables in roster order, built lazily one individual at a time so only
    /// a single individual's calls are held at once
    pub fn tables(&self) -> impl Iterator<Item = IndividualTable> + '_ {
        self.roster
            .entries()
            .iter()
            .map(move |entry| self.table_for(entry))
    }

    /// Calls for one individual, in row order
    pub fn table_for(&self, entry: &RosterEntry) -> IndividualTable {
        let calls = self
            .rows
            .iter()
            .map(|row| {
                let token = row.genotypes.get(entry.column).and_then(|g| g.as_deref());
                let alleles = decode_genotype(token, &row.ref_allele, &row.alt_allele);

                ResolvedCall {
                    chromosome: row.chromosome.clone(),
                    position: row.position,
                    id: row.id.clone(),
                    allele_a: alleles.allele_a,
                    allele_b: alleles.allele_b,
                }
            })
            .collect();

        IndividualTable {
            individual: entry.id.clone(),
            calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(chromosome: &str, position: u64, genotypes: &[Option<&str>]) -> VariantRow {
        VariantRow {
            chromosome: chromosome.to_string(),
            position,
            id: format!("rs{}", position),
            ref_allele: "A".to_string(),
            alt_allele: "G".to_string(),
            genotypes: genotypes.iter().map(|g| g.map(str::to_string)).collect(),
        }
    }

    fn roster() -> Roster {
        Roster::from_header(&["CHROM", "POS", "ID", "REF", "ALT", "HG01", "VeryLongSampleName", "HG03"])
    }

    #[test]
    fn test_one_table_per_individual_in_roster_order() {
        let rows = vec![
            row("1", 100, &[Some("0|0"), Some("1|1"), Some("1|1")]),
            row("1", 200, &[Some("0|1"), Some("0|0"), None]),
        ];
        let roster = roster();
        let writer = FanoutWriter::new(&rows, &roster);
        let tables: Vec<_> = writer.tables().collect();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].individual, "HG01");
        assert_eq!(tables[1].individual, "HG03");

        let hg01: Vec<_> = tables[0]
            .calls
            .iter()
            .map(|c| (c.position, c.allele_a.as_str(), c.allele_b.as_str()))
            .collect();
        assert_eq!(hg01, vec![(100, "A", "A"), (200, "A", "G")]);

        // HG03 reads column 2, skipping the long-named column
        let hg03: Vec<_> = tables[1]
            .calls
            .iter()
            .map(|c| (c.position, c.allele_a.as_str(), c.allele_b.as_str()))
            .collect();
        assert_eq!(hg03, vec![(100, "G", "G"), (200, "A", "A")]);
    }

    #[test]
    fn test_chunk_cursor_is_last_row() {
        let rows = vec![row("3", 10, &[]), row("4", 5, &[])];
        let roster = roster();
        let writer = FanoutWriter::new(&rows, &roster);
        assert_eq!(writer.chunk_cursor(), Some(Cursor::new("4", 5)));

        let empty: Vec<VariantRow> = Vec::new();
        assert_eq!(FanoutWriter::new(&empty, &roster).chunk_cursor(), None);
    }

    #[test]
    fn test_short_row_decodes_as_missing() {
        let rows = vec![row("1", 100, &[Some("1|1")])];
        let roster = roster();
        let tables: Vec<_> = FanoutWriter::new(&rows, &roster).tables().collect();

        assert_eq!(tables[1].calls[0].allele_a, "A");
        assert_eq!(tables[1].calls[0].allele_b, "A");
    }

    #[test]
    fn test_to_csv() {
        let table = IndividualTable {
            individual: "HG01".to_string(),
            calls: vec![
                ResolvedCall {
                    chromosome: "1".to_string(),
                    position: 100,
                    id: "rs1".to_string(),
                    allele_a: "A".to_string(),
                    allele_b: "G".to_string(),
                },
                ResolvedCall {
                    chromosome: "X".to_string(),
                    position: 7,
                    id: ".".to_string(),
                    allele_a: "T".to_string(),
                    allele_b: "T".to_string(),
                },
            ],
        };

        assert_eq!(
            table.to_csv(true).unwrap(),
            "CHROM,POS,ID,REF,ALT\n1,100,rs1,A,G\nX,7,.,T,T\n"
        );
        assert_eq!(table.to_csv(false).unwrap(), "1,100,rs1,A,G\nX,7,.,T,T\n");
    }
}
