//! Sortable variant keys and chunk identifiers.
//!
//! A variant key is a string whose lexicographic order matches the genomic
//! order of the variants on the same chromosome. The database stores it as
//! the primary key, so region queries become key range scans.

use crate::utils;
use crate::variant::{StructuralVariant, Variant};

use std::fmt::Write;

//-----------------------------------------------------------------------------

/// Width of the zero-padded start position in the key.
const START_WIDTH: usize = 10;

/// Alleles longer than this are replaced by their hash in the key.
pub const SV_ALLELE_THRESHOLD: usize = 50;

const SEPARATOR: char = ':';

/// Pads a single-character chromosome name with one leading space.
///
/// Chromosome names of up to two characters then sort in numeric order.
fn pad_chromosome(chromosome: &str) -> String {
    if chromosome.len() == 1 {
        format!(" {}", chromosome)
    } else {
        chromosome.to_string()
    }
}

/// Renders an allele for the key: empty or `-` as nothing, long alleles hashed.
fn render_allele(allele: &str) -> String {
    if allele == "-" {
        return String::new();
    }
    if allele.len() > SV_ALLELE_THRESHOLD {
        utils::fnv1a_hex(allele.as_bytes())
    } else {
        allele.to_string()
    }
}

//-----------------------------------------------------------------------------

/// A sortable storage key for a variant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariantKey(String);

impl VariantKey {
    /// Builds the key for a variant.
    pub fn of(variant: &Variant) -> Self {
        Self::build(
            &variant.chromosome, variant.start,
            &variant.reference, &variant.alternate,
            variant.sv.as_ref(),
        )
    }

    /// Builds a key from the identity fields.
    ///
    /// The format is `CHR:PADDED_START:REF:ALT`, with a tail of confidence
    /// interval offsets and the copy number for structural variants.
    pub fn build(
        chromosome: &str, start: i64,
        reference: &str, alternate: &str,
        sv: Option<&StructuralVariant>,
    ) -> Self {
        let mut key = String::new();
        key.push_str(&pad_chromosome(chromosome));
        key.push(SEPARATOR);
        let _ = write!(key, "{:>width$}", start, width = START_WIDTH);
        key.push(SEPARATOR);
        key.push_str(&render_allele(reference));
        key.push(SEPARATOR);
        key.push_str(&render_allele(alternate));
        if let Some(sv) = sv {
            if !sv.is_empty() {
                for ci in [sv.ci_start_left, sv.ci_start_right, sv.ci_end_left, sv.ci_end_right] {
                    key.push(SEPARATOR);
                    let _ = write!(key, "{}", ci.unwrap_or(0));
                }
                if let Some(cn) = sv.copy_number {
                    key.push(SEPARATOR);
                    let _ = write!(key, "{}", cn);
                }
            }
        }
        VariantKey(key)
    }

    /// Builds the key prefix for a position, used as a range scan bound.
    ///
    /// All keys of variants at `(chromosome, start)` begin with this prefix,
    /// and `prefix(chromosome, start)` sorts before every one of them.
    pub fn prefix(chromosome: &str, start: i64) -> String {
        format!(
            "{}{}{:>width$}",
            pad_chromosome(chromosome), SEPARATOR, start,
            width = START_WIDTH
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<VariantKey> for String {
    fn from(key: VariantKey) -> String {
        key.0
    }
}

impl std::fmt::Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//-----------------------------------------------------------------------------

// Chunk identifiers for coarse index acceleration.

/// Size of a small chunk in base pairs.
pub const CHUNK_SIZE_SMALL: i64 = 1000;

/// Size of a big chunk in base pairs.
pub const CHUNK_SIZE_BIG: i64 = 10_000;

fn chunk_id(chromosome: &str, index: i64, chunk_size: i64) -> String {
    format!("{}_{}_{}k", chromosome, index, chunk_size / 1000)
}

/// Returns the chunk ids stored with a variant at the given position.
///
/// Both the small and the big chunk id are stored, so queries can pick the
/// resolution that matches the region size.
pub fn chunk_ids_at(chromosome: &str, position: i64) -> [String; 2] {
    [
        chunk_id(chromosome, position / CHUNK_SIZE_SMALL, CHUNK_SIZE_SMALL),
        chunk_id(chromosome, position / CHUNK_SIZE_BIG, CHUNK_SIZE_BIG),
    ]
}

/// Returns the chunk ids overlapping a region, at the resolution fitting its size.
///
/// Regions longer than a big chunk use big chunks; shorter ones use small
/// chunks. The bounds are inclusive.
pub fn chunk_ids_for_region(chromosome: &str, start: i64, end: i64) -> Vec<String> {
    let chunk_size = if end - start > CHUNK_SIZE_BIG {
        CHUNK_SIZE_BIG
    } else {
        CHUNK_SIZE_SMALL
    };
    let mut result = Vec::new();
    for index in (start / chunk_size)..=(end / chunk_size) {
        result.push(chunk_id(chromosome, index, chunk_size));
    }
    result
}

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
