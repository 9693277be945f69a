//! Personal data backup workflow.
//!
//! # Responsibility
//! - Describe which tables and rows an external backup client must export.
//! - Mark exported membership applications as backed up, in bulk.
//!
//! # Invariants
//! - No application is marked backed up before its export succeeded.
//! - After a successful run no stale pre-mark copy is served from the
//!   application store identity cache.

pub mod client;
pub mod orchestrator;
pub mod store;
pub mod target;

pub use client::{BackupClient, BackupClientError};
pub use orchestrator::{
    pending_applications_target, BackupError, BackupResult, PersonalDataBackup,
    APPLICATIONS_TABLE, PENDING_BACKUP_FILTER,
};
pub use store::BackupMarkingStore;
pub use target::{BackupPlan, BackupTarget};
