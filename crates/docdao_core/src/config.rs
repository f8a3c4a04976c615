//! Core configuration loaded from JSON.
//!
//! # Responsibility
//! - Describe storage and logging settings as plain data.
//! - Load them from a JSON file or string with per-field defaults.
//!
//! # Invariants
//! - Every field is optional in the source; missing ones take defaults.
//! - Unknown keys are rejected so typos surface at load time.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Document store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite file path. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl StoreConfig {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }
}

/// File logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files. `None` disables logging.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl CoreConfig {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, StoreConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_object_yields_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.store.path, None);
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert!(config.logging.log_dir.is_none());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = CoreConfig::from_json_str(
            r#"{"store": {"path": "/tmp/dao.sqlite3"}, "logging": {"level": "warn"}}"#,
        )
        .unwrap();
        assert_eq!(config.store, StoreConfig::at_path("/tmp/dao.sqlite3"));
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CoreConfig::from_json_str(r#"{"store": {"pool_size": 4}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn load_reports_missing_file_path() {
        let missing = PathBuf::from("/definitely/not/here/docdao.json");
        let err = CoreConfig::load(&missing).unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("unexpected error: {other}"),
        }
    }
}
