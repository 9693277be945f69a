//! Membership application use-case service.
//!
//! # Responsibility
//! - Accept new applications and flag the ones needing moderation.
//! - Cancel applications and report the outcome as a response object.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - A cancelled application cannot be cancelled again.

use crate::model::application::{
    now_epoch_ms, Applicant, ApplicationId, ApplicationValidationError, MembershipApplication,
    MembershipFee, MembershipType, PaymentInterval,
};
use crate::repo::application_repo::{
    ApplicationListQuery, ApplicationRepository, RepoError, RepoResult,
};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Yearly fee above which an application is held for moderation, in cents.
pub const MODERATION_YEARLY_FEE_THRESHOLD_CENTS: i64 = 1_000_00;

/// Service error for application use-cases.
#[derive(Debug)]
pub enum ApplicationServiceError {
    Validation(ApplicationValidationError),
    Repo(RepoError),
}

impl Display for ApplicationServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApplicationServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for ApplicationServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

impl From<ApplicationValidationError> for ApplicationServiceError {
    fn from(value: ApplicationValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Request model for a new membership application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyForMembershipRequest {
    pub applicant: Applicant,
    pub membership_type: MembershipType,
    /// Amount per payment in euro cents.
    pub fee_amount_cents: i64,
    pub payment_interval: PaymentInterval,
}

/// Response model for an accepted membership application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyForMembershipResponse {
    pub application_id: ApplicationId,
    pub needs_moderation: bool,
}

/// Request model for cancelling an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationRequest {
    pub application_id: ApplicationId,
}

/// Response model for a cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancellationResponse {
    pub application_id: ApplicationId,
    pub is_success: bool,
}

/// Use-case facade over application repository implementations.
pub struct ApplicationService<R: ApplicationRepository> {
    repo: R,
}

impl<R: ApplicationRepository> ApplicationService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Validates and stores a new application.
    pub fn apply(
        &self,
        request: ApplyForMembershipRequest,
    ) -> Result<ApplyForMembershipResponse, ApplicationServiceError> {
        let fee = MembershipFee::new(request.fee_amount_cents, request.payment_interval);
        let mut application = MembershipApplication::new(
            request.applicant,
            request.membership_type,
            fee,
            now_epoch_ms(),
        );
        application.validate()?;
        application.needs_moderation = fee
            .yearly_amount_cents()
            .is_some_and(|yearly_cents| yearly_cents > MODERATION_YEARLY_FEE_THRESHOLD_CENTS);

        let application_id = self.repo.create_application(&application)?;
        info!(
            "event=application_apply module=service status=ok application_id={application_id} needs_moderation={}",
            application.needs_moderation
        );
        Ok(ApplyForMembershipResponse {
            application_id,
            needs_moderation: application.needs_moderation,
        })
    }

    /// Cancels an application.
    ///
    /// Unknown and already cancelled applications yield an unsuccessful
    /// response rather than an error.
    pub fn cancel(
        &self,
        request: CancellationRequest,
    ) -> Result<CancellationResponse, ApplicationServiceError> {
        let failure = CancellationResponse {
            application_id: request.application_id,
            is_success: false,
        };

        let Some(mut application) = self.repo.get_application(request.application_id)? else {
            return Ok(failure);
        };
        if application.is_cancelled {
            return Ok(failure);
        }

        application.cancel();
        self.repo.update_application(&application)?;
        info!(
            "event=application_cancel module=service status=ok application_id={}",
            request.application_id
        );
        Ok(CancellationResponse {
            application_id: request.application_id,
            is_success: true,
        })
    }

    /// Gets one application by id.
    pub fn show(&self, id: ApplicationId) -> RepoResult<Option<MembershipApplication>> {
        self.repo.get_application(id)
    }

    /// Lists applications using filter and pagination options.
    pub fn list(&self, query: &ApplicationListQuery) -> RepoResult<Vec<MembershipApplication>> {
        self.repo.list_applications(query)
    }
}
