//! Runtime configuration for membership core callers.
//!
//! # Responsibility
//! - Load a JSON configuration file with defaults for every field.
//! - Bootstrap logging and the database from one place.
//!
//! # Invariants
//! - Missing fields fall back to defaults; unknown fields are rejected.
//! - `database_path = None` selects an in-memory database.

use crate::backup::{BackupClient, BackupMarkingStore, PersonalDataBackup};
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::logging::{default_log_level, init_logging};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub log_dir: Option<String>,
    /// Fail backup runs whose identity cache invalidation fails.
    pub strict_cache_invalidation: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            strict_cache_invalidation: false,
        }
    }
}

impl CoreConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Starts file logging when `log_dir` is configured.
    pub fn init_logging(&self) -> Result<(), String> {
        match self.log_dir.as_deref() {
            Some(log_dir) => init_logging(&self.log_level, log_dir),
            None => Ok(()),
        }
    }

    /// Opens and migrates the configured database.
    pub fn open_database(&self) -> DbResult<Connection> {
        match self.database_path.as_ref() {
            Some(path) => open_db(path),
            None => open_db_in_memory(),
        }
    }

    /// Builds a backup orchestrator honoring `strict_cache_invalidation`.
    pub fn personal_data_backup<C: BackupClient, S: BackupMarkingStore>(
        &self,
        client: C,
        store: S,
    ) -> PersonalDataBackup<C, S> {
        PersonalDataBackup::new(client, store)
            .with_strict_cache_invalidation(self.strict_cache_invalidation)
    }
}
