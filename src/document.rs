//! A small ordered document tree, stored as a blob in the database.
//!
//! Variants are persisted as documents rather than fixed-layout rows, because
//! the stored structure evolves with annotation generations and per-study
//! payloads. A [`Document`] maps field names to [`Value`] nodes, and nested
//! fields can be read with dotted paths (`studies.gt`).

use crate::error::StorageError;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

//-----------------------------------------------------------------------------

/// A value stored in a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    /// Returns the value as an integer, coercing doubles with an integral value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Double(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    /// Returns the value as a double, coercing integers.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_document_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Numeric or string ordering against another value; `None` if the types do not compare.
    pub fn compare(&self, other: &Value) -> Option<std::cmp::Ordering> {
        if let (Some(left), Some(right)) = (self.as_double(), other.as_double()) {
            return left.partial_cmp(&right);
        }
        match (self, other) {
            (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
            (Value::Bool(left), Value::Bool(right)) => Some(left.cmp(right)),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self { Value::Int(value) }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self { Value::Int(value as i64) }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self { Value::Double(value) }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self { Value::Bool(value) }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self { Value::String(value.to_string()) }
}

impl From<String> for Value {
    fn from(value: String) -> Self { Value::String(value) }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self { Value::Bytes(value) }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self { Value::Array(value) }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self { Value::Document(value) }
}

//-----------------------------------------------------------------------------

/// An ordered map of field names to values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    /// Inserts a field, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Removes a field and returns its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn get_array_mut(&mut self, key: &str) -> Option<&mut Vec<Value>> {
        self.fields.get_mut(key).and_then(Value::as_array_mut)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Follows a dotted path into nested documents.
    ///
    /// Array segments are not traversed here; see the predicate evaluator
    /// for array-aware matching.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let value = current.get(segment)?;
            if segments.peek().is_none() {
                return Some(value);
            }
            current = value.as_document()?;
        }
        None
    }

    /// Replaces the value at a dotted path, creating intermediate documents.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        let mut current = self;
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments[..segments.len() - 1] {
            let entry = current.fields
                .entry(segment.to_string())
                .or_insert_with(|| Value::Document(Document::new()));
            if !matches!(entry, Value::Document(_)) {
                *entry = Value::Document(Document::new());
            }
            current = match entry {
                Value::Document(doc) => doc,
                _ => unreachable!(),
            };
        }
        current.fields.insert(segments[segments.len() - 1].to_string(), value.into());
    }

    // Typed accessors in the manner of typed row getters.

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_int()
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_double()
    }

    pub fn get_array(&self, key: &str) -> Option<&[Value]> {
        self.get(key)?.as_array()
    }

    pub fn get_document(&self, key: &str) -> Option<&Document> {
        self.get(key)?.as_document()
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.get(key)?.as_bytes()
    }

    /// Serializes the document into a blob for storage.
    pub fn to_blob(&self) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes a document from a stored blob.
    pub fn from_blob(blob: &[u8]) -> Result<Self, StorageError> {
        Ok(bincode::deserialize(blob)?)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (key, value) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}: {:?}", key, value)?;
        }
        write!(f, "}}")
    }
}

//-----------------------------------------------------------------------------


//-----------------------------------------------------------------------------
