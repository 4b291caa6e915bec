//! Error types for the variant store.

use thiserror::Error;

//-----------------------------------------------------------------------------

/// Errors reported by the storage engine, the codecs, and the query compiler.
///
/// Filter-related errors carry the offending field and value so that callers
/// can report them verbatim to the user.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A filter value that does not follow the grammar of its field.
    #[error("malformed filter {field} = {raw_value:?}: {reason}")]
    MalformedFilter {
        field: String,
        raw_value: String,
        reason: String,
    },

    /// A named entity (study, sample, file, cohort) unknown to the metadata.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// A named entity that exists but is not visible at the requested release.
    #[error("{field} {name:?} is not available until release {release}")]
    StaleReference {
        field: String,
        name: String,
        release: i32,
    },

    /// A registered filter field that this backend cannot compile.
    #[error("unsupported filter field: {field}")]
    UnsupportedFilter { field: String },

    /// A mismatch between expected and observed row counts in a destructive operation.
    #[error("consistency failure in {operation}: expected {expected} rows, got {actual}")]
    Consistency {
        operation: String,
        expected: usize,
        actual: usize,
    },

    /// The database file exists, is missing, or has an unexpected version.
    #[error("{0}")]
    Database(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("document serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Convenience constructor for [`StorageError::MalformedFilter`].
    pub fn malformed(field: &str, raw_value: &str, reason: impl Into<String>) -> Self {
        StorageError::MalformedFilter {
            field: field.to_string(),
            raw_value: raw_value.to_string(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`StorageError::NotFound`].
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        StorageError::NotFound { kind, name: name.into() }
    }

    /// Convenience constructor for [`StorageError::UnsupportedFilter`].
    pub fn unsupported(field: impl Into<String>) -> Self {
        StorageError::UnsupportedFilter { field: field.into() }
    }
}

impl From<bincode::Error> for StorageError {
    fn from(value: bincode::Error) -> Self {
        StorageError::Serialization(value.to_string())
    }
}

//-----------------------------------------------------------------------------
