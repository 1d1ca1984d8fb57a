// ==============================================================================
// genotype_converter.rs - Genotype Token to Allele Pair Conversion
// ==============================================================================
// Description: Decodes diploid genotype tokens into literal allele pairs
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================
// Algorithm:
//   Given REF allele and ALT allele from the variant row:
//   - 0|0 (e.g., REF=A) → (A, A)
//   - 1|1 (e.g., ALT=G) → (G, G)
//   - anything else (0|1, 1|0, ./., 2|1, garbage) → (A, G)
//   - missing token → treated as 0|0, with a warning
//   Heterozygous and unknown shapes share one representation. This is a
//   simplification, not full genotype fidelity.
// ==============================================================================

use tracing::warn;

/// Separator between the two allele indices of a phased genotype
pub const ALLELE_SEPARATOR: char = '|';

/// Classification of a raw genotype token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeCall {
    /// `0|0`
    HomRef,
    /// `1|1`
    HomAlt,
    /// Any other shape, including heterozygous and malformed tokens
    Other,
    /// No token at all. Resolved as [`GenotypeCall::HomRef`].
    Missing,
}

impl GenotypeCall {
    /// Classify a raw token
    pub fn classify(token: Option<&str>) -> Self {
        let Some(token) = token else {
            return GenotypeCall::Missing;
        };

        let mut parts = token.split(ALLELE_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some("0"), Some("0"), None) => GenotypeCall::HomRef,
            (Some("1"), Some("1"), None) => GenotypeCall::HomAlt,
            _ => GenotypeCall::Other,
        }
    }
}

/// Resolved pair of literal alleles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllelePair {
    pub allele_a: String,
    pub allele_b: String,
}

impl AllelePair {
    fn new(a: &str, b: &str) -> Self {
        Self {
            allele_a: a.to_string(),
            allele_b: b.to_string(),
        }
    }
}

/// Resolve a genotype token against REF and ALT alleles
///
/// # Arguments
/// * `token` - Raw genotype token (e.g., "0|0"), `None` if the cell was empty
/// * `ref_allele` - Reference allele (e.g., "T")
/// * `alt_allele` - Alternate allele (e.g., "C")
///
/// Never fails: a missing token logs a warning and resolves to REF/REF.
///
/// # Examples
/// ```
/// use cohort_splitter::genotype_converter::decode_genotype;
///
/// let pair = decode_genotype(Some("1|1"), "T", "C");
/// assert_eq!((pair.allele_a.as_str(), pair.allele_b.as_str()), ("C", "C"));
///
/// let pair = decode_genotype(Some("0|1"), "T", "C");
/// assert_eq!((pair.allele_a.as_str(), pair.allele_b.as_str()), ("T", "C"));
///
/// let pair = decode_genotype(None, "T", "C");
/// assert_eq!((pair.allele_a.as_str(), pair.allele_b.as_str()), ("T", "T"));
/// ```
pub fn decode_genotype(token: Option<&str>, ref_allele: &str, alt_allele: &str) -> AllelePair {
    resolve(GenotypeCall::classify(token), ref_allele, alt_allele)
}

/// Resolve an already classified call
pub fn resolve(call: GenotypeCall, ref_allele: &str, alt_allele: &str) -> AllelePair {
    match call {
        GenotypeCall::HomRef => AllelePair::new(ref_allele, ref_allele),
        GenotypeCall::HomAlt => AllelePair::new(alt_allele, alt_allele),
        GenotypeCall::Other => AllelePair::new(ref_allele, alt_allele),
        GenotypeCall::Missing => {
            warn!(
                "Missing genotype token (REF={}, ALT={}), defaulting to homozygous reference",
                ref_allele, alt_allele
            );
            AllelePair::new(ref_allele, ref_allele)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(token: Option<&str>, ref_allele: &str, alt_allele: &str) -> (String, String) {
        let p = decode_genotype(token, ref_allele, alt_allele);
        (p.allele_a, p.allele_b)
    }

    #[test]
    fn test_homozygous_reference() {
        assert_eq!(pair(Some("0|0"), "T", "C"), ("T".into(), "T".into()));
        assert_eq!(pair(Some("0|0"), "AT", "A"), ("AT".into(), "AT".into()));
    }

    #[test]
    fn test_homozygous_alternate() {
        assert_eq!(pair(Some("1|1"), "T", "C"), ("C".into(), "C".into()));
        assert_eq!(pair(Some("1|1"), "G", "GTT"), ("GTT".into(), "GTT".into()));
    }

    #[test]
    fn test_heterozygous_and_unknown_collapse() {
        for token in ["0|1", "1|0", "./.", ".|.", "2|1", "0/0", "1/1", "0|0|0", "", " ", "abc"] {
            assert_eq!(
                pair(Some(token), "A", "G"),
                ("A".into(), "G".into()),
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_missing_token_defaults_to_reference() {
        assert_eq!(GenotypeCall::classify(None), GenotypeCall::Missing);
        assert_eq!(pair(None, "A", "G"), ("A".into(), "A".into()));
    }

    #[test]
    fn test_classify() {
        assert_eq!(GenotypeCall::classify(Some("0|0")), GenotypeCall::HomRef);
        assert_eq!(GenotypeCall::classify(Some("1|1")), GenotypeCall::HomAlt);
        assert_eq!(GenotypeCall::classify(Some("1|0")), GenotypeCall::Other);
        assert_eq!(GenotypeCall::classify(Some(" 0|0")), GenotypeCall::Other);
    }
}
