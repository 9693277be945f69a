//! Backup client contract.
//!
//! The export mechanism (one dump file, one file per table, remote upload)
//! belongs to the implementor. Callers only rely on `Ok` meaning the plan's
//! rows are durably stored.

use crate::backup::target::BackupPlan;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Failure reported by a backup client.
#[derive(Debug)]
pub struct BackupClientError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl BackupClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync + 'static>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for BackupClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for BackupClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn Error + 'static))
    }
}

/// Exports table data to durable storage.
pub trait BackupClient {
    /// Exports every target of `plan`; returns only once the data is durable.
    fn export(&self, plan: &BackupPlan) -> Result<(), BackupClientError>;
}

impl<C: BackupClient + ?Sized> BackupClient for &C {
    fn export(&self, plan: &BackupPlan) -> Result<(), BackupClientError> {
        (**self).export(plan)
    }
}
