//! Model descriptors: which collection a repository talks to and how new
//! records of that collection are instantiated.
//!
//! # Responsibility
//! - Bind a repository to one collection and its primary-key field.
//! - Apply per-field creation defaults before a record is persisted.
//!
//! # Invariants
//! - A freshly instantiated record always carries a string primary key.
//! - Caller-supplied fields win over descriptor defaults.

use crate::model::document::{Document, DocumentId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Primary-key field name used when neither the repository nor the
/// descriptor names one.
pub const DEFAULT_PRIMARY_KEY: &str = "_id";

/// Value applied to a field the caller left out on create.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// Fixed JSON value.
    Value(Value),
    /// Creation time in Unix epoch milliseconds.
    EpochMillis,
    /// Fresh random identifier string.
    GeneratedId,
}

impl FieldDefault {
    fn resolve(&self, now_ms: i64) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::EpochMillis => Value::from(now_ms),
            Self::GeneratedId => DocumentId::generate().to_value(),
        }
    }
}

/// Handle identifying a collection and its primary-key field.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    collection: String,
    primary_key: Option<String>,
    defaults: Vec<(String, FieldDefault)>,
}

impl ModelDescriptor {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            primary_key: None,
            defaults: Vec::new(),
        }
    }

    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = Some(field.into());
        self
    }

    /// Registers a creation default. A later default for the same field
    /// replaces the earlier one.
    pub fn with_default(mut self, field: impl Into<String>, default: FieldDefault) -> Self {
        let field = field.into();
        self.defaults.retain(|(existing, _)| existing != &field);
        self.defaults.push((field, default));
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn defaults(&self) -> &[(String, FieldDefault)] {
        &self.defaults
    }

    /// Builds the record that `create_one` persists.
    ///
    /// Field order: key, then defaults the caller did not supply, then the
    /// caller's fields. A `null` key counts as absent and is generated.
    ///
    /// # Errors
    /// - Returns a message when the caller's key is neither a string nor null.
    pub fn instantiate(
        &self,
        primary_key: &str,
        item: &Document,
    ) -> Result<(DocumentId, Document), String> {
        let id = match item.get(primary_key) {
            None | Some(Value::Null) => DocumentId::generate(),
            Some(Value::String(value)) => DocumentId::new(value.clone()),
            Some(other) => {
                return Err(format!(
                    "primary key `{primary_key}` must be a string, got {}",
                    value_kind(other)
                ));
            }
        };

        let now_ms = now_epoch_ms();
        let mut record = Document::new();
        record.insert(primary_key.to_string(), id.to_value());
        for (field, default) in &self.defaults {
            if field != primary_key && !item.contains_key(field) {
                record.insert(field.clone(), default.resolve(now_ms));
            }
        }
        for (field, value) in item {
            if field != primary_key {
                record.insert(field.clone(), value.clone());
            }
        }

        Ok((id, record))
    }
}

/// Caller entity type with a typed view over one collection.
pub trait Entity: Serialize + DeserializeOwned {
    fn descriptor() -> ModelDescriptor;
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}
