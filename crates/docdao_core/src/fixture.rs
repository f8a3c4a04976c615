//! Fixture loading for tests and local seeding.
//!
//! # Responsibility
//! - Parse `{ "<collection>": [ {record}, ... ] }` fixture files.
//! - Reset a store and insert fixture records through an explicit
//!   populator object with a connect/close lifecycle.
//!
//! # Invariants
//! - `populate` always starts from an empty store.
//! - Fixture records without a key receive a generated one.

use crate::config::StoreConfig;
use crate::driver::sqlite::SqliteDocumentStore;
use crate::driver::{CollectionRef, DriverError, StorageDriver};
use crate::model::descriptor::{ModelDescriptor, DEFAULT_PRIMARY_KEY};
use crate::model::document::Document;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug)]
pub enum FixtureError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    InvalidRecord { collection: String, index: usize, message: String },
    Driver(DriverError),
}

impl Display for FixtureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read fixtures `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid fixture file: {err}"),
            Self::InvalidRecord {
                collection,
                index,
                message,
            } => write!(f, "fixture `{collection}`[{index}]: {message}"),
            Self::Driver(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FixtureError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidRecord { .. } => None,
            Self::Driver(err) => Some(err),
        }
    }
}

impl From<DriverError> for FixtureError {
    fn from(value: DriverError) -> Self {
        Self::Driver(value)
    }
}

impl From<serde_json::Error> for FixtureError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Records to seed, grouped by collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureSet {
    collections: BTreeMap<String, Vec<Document>>,
}

impl FixtureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(source: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&source)
    }

    pub fn with_records(mut self, collection: impl Into<String>, records: Vec<Document>) -> Self {
        self.collections
            .entry(collection.into())
            .or_default()
            .extend(records);
        self
    }

    pub fn collections(&self) -> impl Iterator<Item = (&str, &[Document])> {
        self.collections
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateReport {
    /// Records removed by the reset step.
    pub dropped: usize,
    pub inserted: usize,
}

/// Owns a driver handle for the duration of one seeding session.
pub struct Populator<D> {
    driver: D,
    primary_keys: BTreeMap<String, String>,
}

impl Populator<SqliteDocumentStore> {
    /// Opens the SQLite store described by `config`.
    pub fn connect(config: &StoreConfig) -> Result<Self, FixtureError> {
        Ok(Self::new(SqliteDocumentStore::open(config)?))
    }

    /// Closes the underlying connection.
    pub fn close(self) -> Result<(), FixtureError> {
        Ok(self.driver.close()?)
    }
}

impl<D: StorageDriver> Populator<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            primary_keys: BTreeMap::new(),
        }
    }

    /// Uses `field` as the key of `collection` instead of `_id`.
    pub fn with_primary_key(
        mut self,
        collection: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        self.primary_keys.insert(collection.into(), field.into());
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Drops every collection; returns how many records were removed.
    pub fn reset(&self) -> Result<usize, FixtureError> {
        let mut dropped = 0;
        for collection in self.driver.list_collections()? {
            dropped += self.driver.drop_collection(&collection)?;
        }
        Ok(dropped)
    }

    /// Resets the store, then inserts every fixture record in file order.
    pub fn populate(&self, fixtures: &FixtureSet) -> Result<PopulateReport, FixtureError> {
        let started_at = Instant::now();
        info!(
            "event=fixture_populate module=fixture status=start collections={} records={}",
            fixtures.collections.len(),
            fixtures.record_count()
        );

        let result = self.reset().and_then(|dropped| {
            let inserted = self.insert_all(fixtures)?;
            Ok(PopulateReport { dropped, inserted })
        });

        match &result {
            Ok(report) => info!(
                "event=fixture_populate module=fixture status=ok dropped={} inserted={} \
                 duration_ms={}",
                report.dropped,
                report.inserted,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=fixture_populate module=fixture status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn insert_all(&self, fixtures: &FixtureSet) -> Result<usize, FixtureError> {
        let mut inserted = 0;
        for (collection, records) in fixtures.collections() {
            let primary_key = self
                .primary_keys
                .get(collection)
                .map_or(DEFAULT_PRIMARY_KEY, String::as_str);
            let descriptor = ModelDescriptor::new(collection);
            let target = CollectionRef::new(collection, primary_key);

            for (index, record) in records.iter().enumerate() {
                let (_, instance) = descriptor.instantiate(primary_key, record).map_err(|message| {
                    FixtureError::InvalidRecord {
                        collection: collection.to_string(),
                        index,
                        message,
                    }
                })?;
                self.driver.insert_one(target, &instance)?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
