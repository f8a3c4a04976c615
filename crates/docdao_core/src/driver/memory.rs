//! In-memory document store.
//!
//! # Responsibility
//! - Back repositories in tests and ephemeral tools without SQLite.
//!
//! # Invariants
//! - Natural order is insertion order within a collection.
//! - Key lookups read `target.primary_key` from the stored document, so a
//!   collection can be addressed through any string field.
//! - The store is `Send + Sync`; every call takes the lock once.

use crate::driver::eval::evaluate;
use crate::driver::{has_key, insert_key, CollectionRef, DriverError, DriverResult, StorageDriver};
use crate::model::document::{Document, DocumentId};
use crate::model::filter::Filter;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type Collections = BTreeMap<String, Vec<Document>>;

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<Collections>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> DriverResult<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| DriverError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> DriverResult<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| DriverError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl StorageDriver for MemoryDocumentStore {
    fn find_by_key(
        &self,
        target: CollectionRef<'_>,
        id: &DocumentId,
    ) -> DriverResult<Option<Document>> {
        let collections = self.read()?;
        Ok(collections.get(target.name).and_then(|entries| {
            entries
                .iter()
                .find(|document| has_key(target, document, id))
                .cloned()
        }))
    }

    fn find(&self, target: CollectionRef<'_>, filter: &Filter) -> DriverResult<Vec<Document>> {
        let snapshot: Vec<Document> = {
            let collections = self.read()?;
            collections
                .get(target.name)
                .cloned()
                .unwrap_or_default()
        };
        evaluate(target, snapshot, filter)
    }

    fn insert_one(&self, target: CollectionRef<'_>, document: &Document) -> DriverResult<()> {
        let id = insert_key(target, document)?;
        let mut collections = self.write()?;
        let entries = collections.entry(target.name.to_string()).or_default();
        if entries.iter().any(|existing| has_key(target, existing, &id)) {
            return Err(DriverError::DuplicateKey {
                collection: target.name.to_string(),
                id,
            });
        }
        entries.push(document.clone());
        Ok(())
    }

    fn update_by_key(
        &self,
        target: CollectionRef<'_>,
        id: &DocumentId,
        patch: &Document,
    ) -> DriverResult<bool> {
        let mut collections = self.write()?;
        let Some(document) = collections
            .get_mut(target.name)
            .and_then(|entries| {
                entries
                    .iter_mut()
                    .find(|document| has_key(target, document, id))
            })
        else {
            return Ok(false);
        };

        for (field, value) in patch {
            if field != target.primary_key {
                document.insert(field.clone(), value.clone());
            }
        }
        Ok(true)
    }

    fn delete_by_key(&self, target: CollectionRef<'_>, id: &DocumentId) -> DriverResult<bool> {
        let mut collections = self.write()?;
        let Some(entries) = collections.get_mut(target.name) else {
            return Ok(false);
        };
        let before = entries.len();
        entries.retain(|document| !has_key(target, document, id));
        Ok(entries.len() != before)
    }

    fn list_collections(&self) -> DriverResult<Vec<String>> {
        let collections = self.read()?;
        Ok(collections
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn drop_collection(&self, collection: &str) -> DriverResult<usize> {
        let mut collections = self.write()?;
        Ok(collections
            .remove(collection)
            .map_or(0, |entries| entries.len()))
    }
}
