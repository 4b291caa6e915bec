//! Utility functions shared by the codecs and the store.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

//-----------------------------------------------------------------------------

/// Returns `true` if the file exists.
pub fn file_exists<P: AsRef<Path>>(filename: P) -> bool {
    fs::metadata(filename).is_ok()
}

//-----------------------------------------------------------------------------

// Compression of stored blobs.

/// Blobs at most this long are stored uncompressed.
pub const COMPRESSION_THRESHOLD: usize = 50;

/// Compresses the blob with zlib if it is longer than [`COMPRESSION_THRESHOLD`].
///
/// If compression fails, the original bytes are stored as they are.
/// See [`maybe_decompress`] for reading the blob back.
pub fn maybe_compress(data: Vec<u8>) -> Vec<u8> {
    if data.len() <= COMPRESSION_THRESHOLD {
        return data;
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(&data).is_err() {
        return data;
    }
    match encoder.finish() {
        Ok(compressed) => compressed,
        Err(_) => data,
    }
}

/// Decompresses a blob written by [`maybe_compress`].
///
/// Bytes that do not decompress as zlib are returned unchanged.
pub fn maybe_decompress(data: &[u8]) -> Vec<u8> {
    let mut decoder = ZlibDecoder::new(data);
    let mut result = Vec::new();
    match decoder.read_to_end(&mut result) {
        Ok(_) => result,
        Err(_) => data.to_vec(),
    }
}

/// Compresses the bytes with zlib unconditionally.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(data).is_err() {
        return data.to_vec();
    }
    encoder.finish().unwrap_or_else(|_| data.to_vec())
}

//-----------------------------------------------------------------------------

// Hashing of long alleles in variant keys.

/// FNV-1a over the bytes, formatted as a fixed-width hexadecimal string.
pub fn fnv1a_hex(data: &[u8]) -> String {
    let mut hash: u64 = 0xCBF29CE484222325;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001B3);
    }
    format!("{:016X}", hash)
}

//-----------------------------------------------------------------------------

// Filter grammar helpers.

/// How the values of a list filter combine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListOperator {
    Or,
    And,
}

/// Splits a raw filter value into its parts.
///
/// `,` separates alternatives and `;` separates conjuncts.
/// A value without separators is a single-element OR list.
/// Returns `None` if both separators are present.
pub fn split_list(value: &str) -> Option<(ListOperator, Vec<&str>)> {
    let has_or = value.contains(',');
    let has_and = value.contains(';');
    match (has_or, has_and) {
        (true, true) => None,
        (false, true) => Some((ListOperator::And, value.split(';').collect())),
        _ => Some((ListOperator::Or, value.split(',').collect())),
    }
}

/// Strips a leading `!` and reports whether it was present.
pub fn strip_negation(value: &str) -> (bool, &str) {
    match value.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, value),
    }
}

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
