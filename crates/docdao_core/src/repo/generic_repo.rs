//! Generic document repository bound to one model descriptor.
//!
//! # Responsibility
//! - Translate CRUD intents into `StorageDriver` calls for one collection.
//! - Normalize driver outcomes into `RepoResult` with an explicit
//!   `NotFound` case.
//!
//! # Invariants
//! - No CRUD call reaches the driver before a descriptor is bound.
//! - `update_by_id` never changes a record's primary key.
//! - Missing keys on delete are `Ok(false)`, never errors.
//! - Batches run in input order and stop at the first failing item.

use crate::driver::{CollectionRef, DriverError, StorageDriver};
use crate::model::descriptor::{ModelDescriptor, DEFAULT_PRIMARY_KEY};
use crate::model::document::{Document, DocumentId};
use crate::model::filter::Filter;
use log::{debug, error, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    /// Repository used before `set_model`.
    Configuration(String),
    /// `id` is `None` when a filter (not a key) found nothing.
    NotFound {
        collection: String,
        id: Option<DocumentId>,
    },
    Persistence(DriverError),
    InvalidData(String),
    InvalidFilter(String),
    Batch {
        index: usize,
        source: Box<RepoError>,
    },
}

impl RepoError {
    /// True for `NotFound`, including a `NotFound` wrapped by `Batch`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Batch { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(message) => write!(f, "repository misconfigured: {message}"),
            Self::NotFound {
                collection,
                id: Some(id),
            } => write!(f, "record `{id}` not found in `{collection}`"),
            Self::NotFound {
                collection,
                id: None,
            } => write!(f, "no record matched the filter in `{collection}`"),
            Self::Persistence(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
            Self::InvalidFilter(message) => write!(f, "invalid filter: {message}"),
            Self::Batch { index, source } => write!(f, "batch item {index} failed: {source}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence(err) => Some(err),
            Self::Batch { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<DriverError> for RepoError {
    fn from(value: DriverError) -> Self {
        match value {
            DriverError::InvalidQuery(message) => Self::InvalidFilter(message),
            other => Self::Persistence(other),
        }
    }
}

/// CRUD contract over schema-less records of one collection.
pub trait DocumentRepository {
    fn collection_name(&self) -> RepoResult<&str>;
    fn primary_key_name(&self) -> &str;

    fn create_one(&self, item: &Document) -> RepoResult<Document>;
    fn create(&self, items: &[Document]) -> RepoResult<Vec<Document>>;
    fn get_by_id(&self, id: &DocumentId) -> RepoResult<Document>;
    fn filter(&self, filter: &Filter) -> RepoResult<Vec<Document>>;
    fn get_one(&self, filter: &Filter) -> RepoResult<Document>;
    fn all(&self) -> RepoResult<Vec<Document>>;
    fn update_by_id(&self, id: &DocumentId, patch: &Document) -> RepoResult<Document>;
    fn remove_by_id(&self, id: &DocumentId) -> RepoResult<bool>;
    fn remove(&self, ids: &[DocumentId]) -> RepoResult<Vec<bool>>;
}

/// Repository over any storage driver handle.
///
/// `D` can be an owned driver, `&D`, `Box<D>` or `Arc<D>`; one driver can
/// back many repositories.
#[derive(Debug)]
pub struct Repository<D> {
    driver: D,
    model: Option<ModelDescriptor>,
    primary_key: Option<String>,
}

impl<D: StorageDriver> Repository<D> {
    /// Creates an unbound repository; call `set_model` before any CRUD call.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            model: None,
            primary_key: None,
        }
    }

    pub fn with_model(driver: D, model: ModelDescriptor) -> Self {
        let mut repo = Self::new(driver);
        repo.set_model(model);
        repo
    }

    pub fn set_model(&mut self, model: ModelDescriptor) {
        self.model = Some(model);
    }

    pub fn model(&self) -> Option<&ModelDescriptor> {
        self.model.as_ref()
    }

    /// Overrides the descriptor's primary-key field.
    pub fn set_primary_key_name(&mut self, name: impl Into<String>) {
        self.primary_key = Some(name.into());
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Filter matching exactly the record keyed by `id`.
    pub fn key_filter(&self, id: &DocumentId) -> Filter {
        Filter::by_key(self.primary_key_name(), id)
    }

    /// Minimal document `{<primary key>: id}`.
    pub fn wrap_key(&self, id: &DocumentId) -> Document {
        let mut document = Document::new();
        document.insert(self.primary_key_name().to_string(), id.to_value());
        document
    }

    fn bound(&self, operation: &str) -> RepoResult<&ModelDescriptor> {
        self.model.as_ref().ok_or_else(|| {
            error!(
                "event=repo_{operation} module=repo status=error error_code=model_unbound"
            );
            RepoError::Configuration(format!(
                "`{operation}` called before a model descriptor was bound"
            ))
        })
    }

    fn target(&self, operation: &str) -> RepoResult<CollectionRef<'_>> {
        let model = self.bound(operation)?;
        Ok(CollectionRef::new(model.collection(), self.primary_key_name()))
    }
}

impl<D: StorageDriver> DocumentRepository for Repository<D> {
    fn collection_name(&self) -> RepoResult<&str> {
        Ok(self.bound("collection_name")?.collection())
    }

    fn primary_key_name(&self) -> &str {
        self.primary_key
            .as_deref()
            .or_else(|| self.model.as_ref().and_then(ModelDescriptor::primary_key))
            .unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    fn create_one(&self, item: &Document) -> RepoResult<Document> {
        let started_at = Instant::now();
        let model = self.bound("create_one")?;
        let target = CollectionRef::new(model.collection(), self.primary_key_name());

        let (id, record) = model
            .instantiate(target.primary_key, item)
            .map_err(RepoError::InvalidData)?;
        if let Err(err) = self.driver.insert_one(target, &record) {
            warn!(
                "event=repo_create_one module=repo status=error collection={} id={} error={}",
                target.name, id, err
            );
            return Err(err.into());
        }

        let created = self.get_by_id(&id)?;
        debug!(
            "event=repo_create_one module=repo status=ok collection={} id={} duration_ms={}",
            target.name,
            id,
            started_at.elapsed().as_millis()
        );
        Ok(created)
    }

    fn create(&self, items: &[Document]) -> RepoResult<Vec<Document>> {
        let target = self.target("create")?;
        let mut created = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let record = self.create_one(item).map_err(|source| {
                warn!(
                    "event=repo_create module=repo status=error collection={} index={} created={}",
                    target.name,
                    index,
                    created.len()
                );
                RepoError::Batch {
                    index,
                    source: Box::new(source),
                }
            })?;
            created.push(record);
        }
        debug!(
            "event=repo_create module=repo status=ok collection={} count={}",
            target.name,
            created.len()
        );
        Ok(created)
    }

    fn get_by_id(&self, id: &DocumentId) -> RepoResult<Document> {
        let target = self.target("get_by_id")?;
        match self.driver.find_by_key(target, id)? {
            Some(record) => Ok(record),
            None => {
                debug!(
                    "event=repo_get_by_id module=repo status=not_found collection={} id={}",
                    target.name, id
                );
                Err(RepoError::NotFound {
                    collection: target.name.to_string(),
                    id: Some(id.clone()),
                })
            }
        }
    }

    fn filter(&self, filter: &Filter) -> RepoResult<Vec<Document>> {
        let started_at = Instant::now();
        let target = self.target("filter")?;
        let records = self.driver.find(target, filter)?;
        debug!(
            "event=repo_filter module=repo status=ok collection={} conditions={} matched={} \
             duration_ms={}",
            target.name,
            filter.conditions.len(),
            records.len(),
            started_at.elapsed().as_millis()
        );
        Ok(records)
    }

    fn get_one(&self, filter: &Filter) -> RepoResult<Document> {
        let target = self.target("get_one")?;
        self.filter(filter)?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::NotFound {
                collection: target.name.to_string(),
                id: None,
            })
    }

    fn all(&self) -> RepoResult<Vec<Document>> {
        self.filter(&Filter::default())
    }

    fn update_by_id(&self, id: &DocumentId, patch: &Document) -> RepoResult<Document> {
        let target = self.target("update_by_id")?;

        let mut patch = patch.clone();
        if patch.remove(target.primary_key).is_some() {
            debug!(
                "event=repo_update_by_id module=repo status=key_stripped collection={} id={}",
                target.name, id
            );
        }

        if !self.driver.update_by_key(target, id, &patch)? {
            return Err(RepoError::NotFound {
                collection: target.name.to_string(),
                id: Some(id.clone()),
            });
        }

        let updated = self.get_by_id(id)?;
        debug!(
            "event=repo_update_by_id module=repo status=ok collection={} id={} fields={}",
            target.name,
            id,
            patch.len()
        );
        Ok(updated)
    }

    fn remove_by_id(&self, id: &DocumentId) -> RepoResult<bool> {
        let target = self.target("remove_by_id")?;
        let removed = self.driver.delete_by_key(target, id)?;
        debug!(
            "event=repo_remove_by_id module=repo status=ok collection={} id={} removed={}",
            target.name, id, removed
        );
        Ok(removed)
    }

    fn remove(&self, ids: &[DocumentId]) -> RepoResult<Vec<bool>> {
        self.target("remove")?;
        ids.iter()
            .enumerate()
            .map(|(index, id)| {
                self.remove_by_id(id).map_err(|source| RepoError::Batch {
                    index,
                    source: Box::new(source),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentRepository, RepoError, Repository};
    use crate::driver::memory::MemoryDocumentStore;
    use crate::driver::DriverError;
    use crate::model::descriptor::ModelDescriptor;
    use crate::model::document::{Document, DocumentId};
    use crate::model::filter::Filter;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unbound_repository_rejects_every_operation() {
        let repo = Repository::new(MemoryDocumentStore::new());
        let id = DocumentId::from("x");

        assert!(matches!(
            repo.create_one(&Document::new()),
            Err(RepoError::Configuration(_))
        ));
        assert!(matches!(repo.get_by_id(&id), Err(RepoError::Configuration(_))));
        assert!(matches!(repo.all(), Err(RepoError::Configuration(_))));
        assert!(matches!(
            repo.update_by_id(&id, &Document::new()),
            Err(RepoError::Configuration(_))
        ));
        assert!(matches!(repo.remove_by_id(&id), Err(RepoError::Configuration(_))));
        assert!(matches!(repo.remove(&[]), Err(RepoError::Configuration(_))));
        assert!(matches!(repo.create(&[]), Err(RepoError::Configuration(_))));
        assert!(repo.model().is_none());
    }

    #[test]
    fn primary_key_resolution_prefers_override_then_descriptor() {
        let mut repo = Repository::new(MemoryDocumentStore::new());
        assert_eq!(repo.primary_key_name(), "_id");

        repo.set_model(ModelDescriptor::new("customer").with_primary_key("code"));
        assert_eq!(repo.primary_key_name(), "code");

        repo.set_primary_key_name("uid");
        assert_eq!(repo.primary_key_name(), "uid");

        let id = DocumentId::from("k");
        assert_eq!(repo.wrap_key(&id), doc(json!({"uid": "k"})));
        assert_eq!(repo.key_filter(&id).conditions, doc(json!({"uid": "k"})));
    }

    #[test]
    fn mixed_projection_surfaces_as_invalid_filter() {
        let repo = Repository::with_model(MemoryDocumentStore::new(), ModelDescriptor::new("c"));
        let err = repo
            .filter(&Filter::new().select(["name", "-age"]))
            .unwrap_err();
        assert!(matches!(err, RepoError::InvalidFilter(_)));
    }

    #[test]
    fn batch_create_reports_failing_index_and_keeps_earlier_items() {
        let repo = Repository::with_model(MemoryDocumentStore::new(), ModelDescriptor::new("c"));
        let items = vec![
            doc(json!({"_id": "a"})),
            doc(json!({"_id": "b"})),
            doc(json!({"_id": "a"})),
            doc(json!({"_id": "c"})),
        ];

        let err = repo.create(&items).unwrap_err();
        match err {
            RepoError::Batch { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(
                    *source,
                    RepoError::Persistence(DriverError::DuplicateKey { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(repo.all().unwrap().len(), 2);
    }

    #[test]
    fn non_string_key_is_invalid_data() {
        let repo = Repository::with_model(MemoryDocumentStore::new(), ModelDescriptor::new("c"));
        let err = repo.create_one(&doc(json!({"_id": 7}))).unwrap_err();
        assert!(matches!(err, RepoError::InvalidData(_)));
    }

    #[test]
    fn not_found_is_detectable_through_batches() {
        let err = RepoError::Batch {
            index: 0,
            source: Box::new(RepoError::NotFound {
                collection: "c".to_string(),
                id: None,
            }),
        };
        assert!(err.is_not_found());
        assert!(!RepoError::InvalidData("x".to_string()).is_not_found());
    }
}
