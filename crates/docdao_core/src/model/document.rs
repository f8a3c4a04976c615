//! Schema-less record and key types.
//!
//! # Responsibility
//! - Represent one stored document as an ordered field map.
//! - Provide the string key type shared by repositories and drivers.
//!
//! # Invariants
//! - A stored document's primary-key value is always a JSON string.
//! - Field order is the insertion order of the map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// One schema-less record: field name to dynamically typed value.
pub type Document = Map<String, Value>;

/// Primary key of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh random key (UUID v4, hyphenated).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Reads the key stored under `field`.
    ///
    /// Returns `None` when the field is absent or not a string.
    pub fn from_document(document: &Document, field: &str) -> Option<Self> {
        match document.get(field) {
            Some(Value::String(value)) => Some(Self(value.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Uuid> for DocumentId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Looks up a possibly dotted field path (`address.city`) inside a document.
pub fn lookup_path<'doc>(document: &'doc Document, path: &str) -> Option<&'doc Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
