//! Storage driver contract and bundled implementations.
//!
//! # Responsibility
//! - Define the primitive calls a repository issues against a collection.
//! - Ship a SQLite document store and an in-memory store behind that
//!   contract.
//!
//! # Invariants
//! - Drivers report absence through `Option`/`bool`, never through errors.
//! - Both bundled drivers share `eval` so reads behave identically.

use crate::db::DbError;
use crate::model::document::{Document, DocumentId};
use crate::model::filter::Filter;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub mod eval;
pub mod memory;
pub mod sqlite;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug)]
pub enum DriverError {
    Db(DbError),
    Codec(serde_json::Error),
    DuplicateKey { collection: String, id: DocumentId },
    /// Document to insert has no string value under its key field.
    InvalidKey { field: String },
    InvalidQuery(String),
    InvalidData(String),
    /// Driver state cannot be accessed (e.g. a poisoned lock).
    Unavailable(String),
}

impl Display for DriverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Codec(err) => write!(f, "document codec error: {err}"),
            Self::DuplicateKey { collection, id } => {
                write!(f, "duplicate key `{id}` in collection `{collection}`")
            }
            Self::InvalidKey { field } => {
                write!(f, "document has no string primary key under `{field}`")
            }
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored document: {message}"),
            Self::Unavailable(message) => write!(f, "storage unavailable: {message}"),
        }
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for DriverError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value)
    }
}

/// Collection a driver call targets, with its primary-key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionRef<'a> {
    pub name: &'a str,
    pub primary_key: &'a str,
}

impl<'a> CollectionRef<'a> {
    pub fn new(name: &'a str, primary_key: &'a str) -> Self {
        Self { name, primary_key }
    }
}

/// Primitive document operations consumed by `repo::Repository`.
pub trait StorageDriver {
    fn find_by_key(&self, target: CollectionRef<'_>, id: &DocumentId)
        -> DriverResult<Option<Document>>;

    /// Returns matching documents, sorted and projected as `filter` asks.
    fn find(&self, target: CollectionRef<'_>, filter: &Filter) -> DriverResult<Vec<Document>>;

    /// Inserts one document; its key is read from `target.primary_key`.
    fn insert_one(&self, target: CollectionRef<'_>, document: &Document) -> DriverResult<()>;

    /// Sets every top-level field of `patch`; returns whether a document
    /// matched `id`.
    fn update_by_key(
        &self,
        target: CollectionRef<'_>,
        id: &DocumentId,
        patch: &Document,
    ) -> DriverResult<bool>;

    /// Returns whether a document was deleted.
    fn delete_by_key(&self, target: CollectionRef<'_>, id: &DocumentId) -> DriverResult<bool>;

    fn list_collections(&self) -> DriverResult<Vec<String>>;

    /// Deletes every document of `collection`; returns how many were removed.
    fn drop_collection(&self, collection: &str) -> DriverResult<usize>;
}

macro_rules! forward_storage_driver {
    ($($wrapper:ty),+) => {$(
        impl<D: StorageDriver + ?Sized> StorageDriver for $wrapper {
            fn find_by_key(
                &self,
                target: CollectionRef<'_>,
                id: &DocumentId,
            ) -> DriverResult<Option<Document>> {
                (**self).find_by_key(target, id)
            }

            fn find(
                &self,
                target: CollectionRef<'_>,
                filter: &Filter,
            ) -> DriverResult<Vec<Document>> {
                (**self).find(target, filter)
            }

            fn insert_one(
                &self,
                target: CollectionRef<'_>,
                document: &Document,
            ) -> DriverResult<()> {
                (**self).insert_one(target, document)
            }

            fn update_by_key(
                &self,
                target: CollectionRef<'_>,
                id: &DocumentId,
                patch: &Document,
            ) -> DriverResult<bool> {
                (**self).update_by_key(target, id, patch)
            }

            fn delete_by_key(
                &self,
                target: CollectionRef<'_>,
                id: &DocumentId,
            ) -> DriverResult<bool> {
                (**self).delete_by_key(target, id)
            }

            fn list_collections(&self) -> DriverResult<Vec<String>> {
                (**self).list_collections()
            }

            fn drop_collection(&self, collection: &str) -> DriverResult<usize> {
                (**self).drop_collection(collection)
            }
        }
    )+};
}

forward_storage_driver!(&D, Box<D>, Arc<D>);

/// Extracts the string key of a document about to be inserted.
pub(crate) fn insert_key(
    target: CollectionRef<'_>,
    document: &Document,
) -> DriverResult<DocumentId> {
    DocumentId::from_document(document, target.primary_key).ok_or_else(|| {
        DriverError::InvalidKey {
            field: target.primary_key.to_string(),
        }
    })
}

/// Whether `document` holds `id` under the target's key field.
pub(crate) fn has_key(target: CollectionRef<'_>, document: &Document, id: &DocumentId) -> bool {
    matches!(document.get(target.primary_key), Some(Value::String(key)) if key == id.as_str())
}
