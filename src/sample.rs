//! Codecs for per-sample data: genotypes and extra format fields.
//!
//! Genotypes are stored as a map from a genotype string to the ordered list
//! of sample ids carrying it. Samples with the study's default genotype are
//! not stored at all; with a typical cohort this makes the map small even
//! for thousands of samples.
//!
//! Extra format fields (depth, genotype quality and the like) are stored per
//! file and field as one packed list in the file's sample order. Numeric
//! values are shifted by one so that 0 can mean "unknown", and long lists
//! are zlib-compressed.

use crate::error::StorageError;
use crate::metadata::{ExtraField, FieldType};
use crate::utils;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};


//-----------------------------------------------------------------------------

/// Genotype reported for samples with no stored data.
pub const UNKNOWN_GENOTYPE: &str = "?/?";

/// Value reported for format fields with no stored data.
pub const UNKNOWN_FIELD: &str = ".";

/// Converts a genotype string to its stored form.
///
/// Missing alleles (`.`) become `-1` so the string survives systems that
/// treat a leading dot specially.
pub fn genotype_to_storage(genotype: &str) -> String {
    genotype.replace('.', "-1")
}

/// Inverse of [`genotype_to_storage`].
pub fn genotype_to_model(genotype: &str) -> String {
    genotype.replace("-1", ".")
}

//-----------------------------------------------------------------------------

/// Groups sample genotypes for storage.
///
/// # Arguments
///
/// * `sample_order`: Samples of the file, in column order.
/// * `genotypes`: Genotype string per sample; absent samples are unknown.
/// * `default_genotypes`: Genotypes that are not stored.
pub fn encode_genotypes(
    sample_order: &[i32],
    genotypes: &BTreeMap<i32, String>,
    default_genotypes: &[String],
) -> BTreeMap<String, Vec<i32>> {
    let mut groups: BTreeMap<String, Vec<i32>> = BTreeMap::new();
    for sample in sample_order {
        let genotype = genotypes.get(sample).map(String::as_str).unwrap_or(UNKNOWN_GENOTYPE);
        if default_genotypes.iter().any(|d| d == genotype) {
            continue;
        }
        groups.entry(genotype_to_storage(genotype)).or_default().push(*sample);
    }
    groups
}

/// Expands stored genotype groups back to per-sample genotypes.
///
/// Samples in `loaded_samples` start from the first default genotype and the
/// rest from [`UNKNOWN_GENOTYPE`]. Groups stored under the unknown genotype
/// are skipped unless `returned_unknown` overrides what they decode to.
pub fn decode_genotypes(
    requested_samples: &[i32],
    groups: &BTreeMap<String, Vec<i32>>,
    loaded_samples: &[i32],
    default_genotypes: &[String],
    returned_unknown: Option<&str>,
) -> BTreeMap<i32, String> {
    let default = default_genotypes.first().map(String::as_str).unwrap_or(UNKNOWN_GENOTYPE);
    let mut result: BTreeMap<i32, String> = BTreeMap::new();
    for sample in requested_samples {
        let initial = if loaded_samples.contains(sample) { default } else { UNKNOWN_GENOTYPE };
        result.insert(*sample, initial.to_string());
    }
    for (stored, samples) in groups {
        let genotype = if stored == UNKNOWN_GENOTYPE {
            match returned_unknown {
                Some(replacement) => replacement.to_string(),
                None => continue,
            }
        } else {
            genotype_to_model(stored)
        };
        for sample in samples {
            if let Some(slot) = result.get_mut(sample) {
                *slot = genotype.clone();
            }
        }
    }
    result
}

//-----------------------------------------------------------------------------

// Numeric shift codec for extra fields.

/// Encodes an integer field value for storage.
///
/// Values are shifted so that 0 is reserved for "unknown"; anything that
/// does not parse as a number encodes as unknown.
pub fn encode_integer(value: &str) -> i32 {
    match value.parse::<f64>() {
        Ok(parsed) => {
            let truncated = parsed as i32;
            if truncated >= 0 { truncated + 1 } else { truncated }
        }
        Err(_) => 0,
    }
}

/// Decodes an integer field value; 0 decodes to [`UNKNOWN_FIELD`].
pub fn decode_integer(value: i32) -> String {
    if value == 0 {
        UNKNOWN_FIELD.to_string()
    } else if value > 0 {
        (value - 1).to_string()
    } else {
        value.to_string()
    }
}

/// Encodes a float field value with three decimals of precision.
pub fn encode_float(value: &str) -> i32 {
    match value.parse::<f64>() {
        Ok(parsed) => {
            let truncated = (parsed * 1000.0) as i32;
            if truncated >= 0 { truncated + 1 } else { truncated }
        }
        Err(_) => 0,
    }
}

/// Decodes a float field value; 0 decodes to [`UNKNOWN_FIELD`].
pub fn decode_float(value: i32) -> String {
    if value == 0 {
        UNKNOWN_FIELD.to_string()
    } else {
        let shifted = if value > 0 { value - 1 } else { value };
        let float = shifted as f64 / 1000.0;
        format!("{}", float)
    }
}

//-----------------------------------------------------------------------------

/// The packed per-file list of one extra field, self-describing by type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum ExtraFieldBlob {
    Ints(Vec<i32>),
    Floats(Vec<i32>),
    Strings(Vec<String>),
}

/// Encodes the values of one extra field, in the file's sample order.
///
/// Missing values should be passed as [`UNKNOWN_FIELD`]. The blob is
/// compressed when the field is declared compressible and the serialized
/// form is long enough to benefit.
pub fn encode_extra_field(field: &ExtraField, values: &[&str]) -> Result<Vec<u8>, StorageError> {
    let blob = match field.field_type {
        FieldType::Integer => ExtraFieldBlob::Ints(values.iter().map(|v| encode_integer(v)).collect()),
        FieldType::Float => ExtraFieldBlob::Floats(values.iter().map(|v| encode_float(v)).collect()),
        FieldType::String => ExtraFieldBlob::Strings(
            values.iter().map(|v| v.to_string()).collect()
        ),
    };
    let serialized = bincode::serialize(&blob)?;
    if field.compress {
        Ok(utils::maybe_compress(serialized))
    } else {
        Ok(serialized)
    }
}

/// Decodes the values of one extra field back to strings.
///
/// The result is aligned to `sample_count`: an exhausted or shorter list
/// yields [`UNKNOWN_FIELD`] for the remaining samples.
pub fn decode_extra_field(data: &[u8], sample_count: usize) -> Result<Vec<String>, StorageError> {
    let raw = utils::maybe_decompress(data);
    let blob: ExtraFieldBlob = bincode::deserialize(&raw)?;
    let mut result = match blob {
        ExtraFieldBlob::Ints(values) => values.into_iter().map(decode_integer).collect::<Vec<_>>(),
        ExtraFieldBlob::Floats(values) => values.into_iter().map(decode_float).collect(),
        ExtraFieldBlob::Strings(values) => values.into_iter()
            .map(|v| if v.is_empty() { UNKNOWN_FIELD.to_string() } else { v })
            .collect(),
    };
    result.resize(sample_count, UNKNOWN_FIELD.to_string());
    result.truncate(sample_count);
    Ok(result)
}

//-----------------------------------------------------------------------------
