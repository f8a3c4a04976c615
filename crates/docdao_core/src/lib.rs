//! Generic document repository core.
//! One repository type serves every collection; storage is pluggable.

pub mod config;
pub mod db;
pub mod driver;
pub mod fixture;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::{ConfigError, CoreConfig, LoggingConfig, StoreConfig};
pub use driver::memory::MemoryDocumentStore;
pub use driver::sqlite::SqliteDocumentStore;
pub use driver::{CollectionRef, DriverError, DriverResult, StorageDriver};
pub use fixture::{FixtureError, FixtureSet, PopulateReport, Populator};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::descriptor::{Entity, FieldDefault, ModelDescriptor, DEFAULT_PRIMARY_KEY};
pub use model::document::{Document, DocumentId};
pub use model::filter::{Filter, SortField, SortOrder};
pub use repo::generic_repo::{DocumentRepository, RepoError, RepoResult, Repository};
pub use repo::typed_repo::TypedRepository;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
