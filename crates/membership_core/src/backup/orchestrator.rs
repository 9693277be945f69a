//! Personal data backup orchestration.
//!
//! # Responsibility
//! - Export not-yet-backed-up membership applications through a `BackupClient`.
//! - Mark the exported rows with the run timestamp in one bulk update.
//! - Invalidate the store identity cache after marking.
//!
//! # Invariants
//! - Export runs to completion before any row is marked.
//! - A failed export leaves the store untouched.
//! - Only rows with `backup_at IS NULL` are marked; re-runs are idempotent.

use crate::backup::client::{BackupClient, BackupClientError};
use crate::backup::store::BackupMarkingStore;
use crate::backup::target::{BackupPlan, BackupTarget};
use crate::model::application::Timestamp;
use crate::repo::application_repo::RepoError;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Table holding membership application personal data.
pub const APPLICATIONS_TABLE: &str = "membership_applications";
/// Row filter selecting applications that were never backed up.
pub const PENDING_BACKUP_FILTER: &str = "backup_at IS NULL";

pub type BackupResult<T> = Result<T, BackupError>;

/// Target selecting every membership application not yet backed up.
pub fn pending_applications_target() -> BackupTarget {
    BackupTarget::new(APPLICATIONS_TABLE, PENDING_BACKUP_FILTER)
}

/// Failure of one backup run.
#[derive(Debug)]
pub enum BackupError {
    /// The client could not export the plan. Nothing was marked.
    Export(BackupClientError),
    /// Export succeeded but marking failed. Safe to retry the whole run.
    Mutation(RepoError),
    /// Marking succeeded but the identity cache could not be cleared.
    ///
    /// Only returned in strict mode; `affected` rows are durably marked.
    CacheInvalidation { affected: usize, source: RepoError },
}

impl Display for BackupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Export(err) => write!(f, "personal data export failed: {err}"),
            Self::Mutation(err) => write!(f, "marking exported applications failed: {err}"),
            Self::CacheInvalidation { affected, source } => write!(
                f,
                "marked {affected} applications but identity cache invalidation failed: {source}"
            ),
        }
    }
}

impl Error for BackupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Export(err) => Some(err),
            Self::Mutation(err) => Some(err),
            Self::CacheInvalidation { source, .. } => Some(source),
        }
    }
}

/// Runs export-then-mark backup cycles over an application store.
pub struct PersonalDataBackup<C, S> {
    client: C,
    store: S,
    strict_cache_invalidation: bool,
}

impl<C: BackupClient, S: BackupMarkingStore> PersonalDataBackup<C, S> {
    pub fn new(client: C, store: S) -> Self {
        Self {
            client,
            store,
            strict_cache_invalidation: false,
        }
    }

    /// When enabled, a failed cache invalidation fails the run instead of
    /// being logged as a warning.
    pub fn with_strict_cache_invalidation(mut self, strict: bool) -> Self {
        self.strict_cache_invalidation = strict;
        self
    }

    /// Exports pending applications and marks them as backed up at `as_of`.
    ///
    /// Returns the number of applications marked by this run.
    pub fn run_backup(&self, as_of: Timestamp) -> BackupResult<usize> {
        self.run_backup_with(as_of, Vec::new())
    }

    /// Same as `run_backup`, exporting `extra_targets` in the same client call.
    ///
    /// Extra targets are exported after the applications target. Marking
    /// still only touches membership applications.
    pub fn run_backup_with(
        &self,
        as_of: Timestamp,
        extra_targets: Vec<BackupTarget>,
    ) -> BackupResult<usize> {
        let started_at = Instant::now();
        let mut plan = BackupPlan::single(pending_applications_target());
        plan.extend(extra_targets);
        info!(
            "event=personal_data_backup module=backup status=start targets={}",
            plan.len()
        );

        if let Err(err) = self.client.export(&plan) {
            error!(
                "event=personal_data_backup module=backup status=error stage=export duration_ms={} error_code=export_failed error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(BackupError::Export(err));
        }

        let affected = self.store.mark_unbacked_up(as_of).map_err(|err| {
            error!(
                "event=personal_data_backup module=backup status=error stage=mark duration_ms={} error_code=mark_failed error={err}",
                started_at.elapsed().as_millis()
            );
            BackupError::Mutation(err)
        })?;

        if let Err(err) = self.store.clear_identity_cache() {
            if self.strict_cache_invalidation {
                error!(
                    "event=personal_data_backup module=backup status=error stage=cache duration_ms={} affected={affected} error_code=cache_invalidation_failed error={err}",
                    started_at.elapsed().as_millis()
                );
                return Err(BackupError::CacheInvalidation {
                    affected,
                    source: err,
                });
            }
            warn!(
                "event=personal_data_backup module=backup status=degraded stage=cache affected={affected} error_code=cache_invalidation_failed error={err}"
            );
        }

        info!(
            "event=personal_data_backup module=backup status=ok duration_ms={} affected={affected}",
            started_at.elapsed().as_millis()
        );
        Ok(affected)
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
