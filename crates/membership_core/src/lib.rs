//! Core domain logic for membership applications.
//! This crate is the single source of truth for application invariants and
//! the personal data backup workflow.

pub mod backup;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use backup::{
    BackupClient, BackupClientError, BackupError, BackupMarkingStore, BackupPlan, BackupResult,
    BackupTarget, PersonalDataBackup,
};
pub use config::{ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::application::{
    now_epoch_ms, Applicant, ApplicationId, ApplicationValidationError, MembershipApplication,
    MembershipFee, MembershipType, PaymentInterval, Timestamp,
};
pub use repo::application_repo::{
    ApplicationListQuery, ApplicationRepository, RepoError, RepoResult,
    SqliteApplicationRepository,
};
pub use service::application_service::{
    ApplicationService, ApplicationServiceError, ApplyForMembershipRequest,
    ApplyForMembershipResponse, CancellationRequest, CancellationResponse,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
