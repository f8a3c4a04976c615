//! Typed view over a document repository.
//!
//! # Responsibility
//! - Convert between caller entity types and schema-less records.
//! - Keep the CRUD semantics of the wrapped repository unchanged.
//!
//! # Invariants
//! - Conversion failures surface as `RepoError::InvalidData`, never panics.

use crate::driver::StorageDriver;
use crate::model::descriptor::Entity;
use crate::model::document::{Document, DocumentId};
use crate::model::filter::Filter;
use crate::repo::generic_repo::{DocumentRepository, RepoError, RepoResult, Repository};
use serde_json::Value;
use std::marker::PhantomData;

/// Repository returning `E` instead of raw documents.
pub struct TypedRepository<E, R> {
    repo: R,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, D: StorageDriver> TypedRepository<E, Repository<D>> {
    /// Builds a repository bound to `E::descriptor()`.
    pub fn for_entity(driver: D) -> Self {
        Self::new(Repository::with_model(driver, E::descriptor()))
    }
}

impl<E: Entity, R: DocumentRepository> TypedRepository<E, R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            _entity: PhantomData,
        }
    }

    pub fn inner(&self) -> &R {
        &self.repo
    }

    pub fn create_one(&self, item: &E) -> RepoResult<E> {
        let created = self.repo.create_one(&to_document(item)?)?;
        from_document(created)
    }

    pub fn create(&self, items: &[E]) -> RepoResult<Vec<E>> {
        let documents = items.iter().map(to_document).collect::<RepoResult<Vec<_>>>()?;
        from_documents(self.repo.create(&documents)?)
    }

    pub fn get_by_id(&self, id: &DocumentId) -> RepoResult<E> {
        from_document(self.repo.get_by_id(id)?)
    }

    pub fn filter(&self, filter: &Filter) -> RepoResult<Vec<E>> {
        from_documents(self.repo.filter(filter)?)
    }

    pub fn get_one(&self, filter: &Filter) -> RepoResult<E> {
        from_document(self.repo.get_one(filter)?)
    }

    pub fn all(&self) -> RepoResult<Vec<E>> {
        from_documents(self.repo.all()?)
    }

    /// Applies a field-level patch; the patch stays schema-less so callers
    /// can set a subset of fields.
    pub fn update_by_id(&self, id: &DocumentId, patch: &Document) -> RepoResult<E> {
        from_document(self.repo.update_by_id(id, patch)?)
    }

    pub fn remove_by_id(&self, id: &DocumentId) -> RepoResult<bool> {
        self.repo.remove_by_id(id)
    }

    pub fn remove(&self, ids: &[DocumentId]) -> RepoResult<Vec<bool>> {
        self.repo.remove(ids)
    }
}

fn to_document<E: Entity>(item: &E) -> RepoResult<Document> {
    match serde_json::to_value(item) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(other) => Err(RepoError::InvalidData(format!(
            "entity must serialize to a map, got {}",
            crate::model::descriptor::value_kind(&other)
        ))),
        Err(err) => Err(RepoError::InvalidData(format!(
            "entity serialization failed: {err}"
        ))),
    }
}

fn from_document<E: Entity>(document: Document) -> RepoResult<E> {
    serde_json::from_value(Value::Object(document))
        .map_err(|err| RepoError::InvalidData(format!("record does not match entity: {err}")))
}

fn from_documents<E: Entity>(documents: Vec<Document>) -> RepoResult<Vec<E>> {
    documents.into_iter().map(from_document).collect()
}
