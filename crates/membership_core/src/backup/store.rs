//! Application store contract consumed by the personal data backup.

use crate::model::application::Timestamp;
use crate::repo::application_repo::RepoResult;

/// Bulk backup-marking capability of an application store.
pub trait BackupMarkingStore {
    /// Sets `backup_at = as_of` on every application where it is unset,
    /// in one set-based statement. Returns the number of affected rows.
    fn mark_unbacked_up(&self, as_of: Timestamp) -> RepoResult<usize>;

    /// Drops every in-process copy of previously loaded applications.
    fn clear_identity_cache(&self) -> RepoResult<()>;
}

impl<S: BackupMarkingStore + ?Sized> BackupMarkingStore for &S {
    fn mark_unbacked_up(&self, as_of: Timestamp) -> RepoResult<usize> {
        (**self).mark_unbacked_up(as_of)
    }

    fn clear_identity_cache(&self) -> RepoResult<()> {
        (**self).clear_identity_cache()
    }
}
