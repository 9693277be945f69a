//! Membership application domain model.
//!
//! # Responsibility
//! - Define the application record persisted by the application store.
//! - Provide fee arithmetic and lifecycle helpers (cancel/confirm).
//!
//! # Invariants
//! - `id` is stable and never nil.
//! - `fee.amount_cents` is strictly positive.
//! - Regular memberships pay at least `MIN_REGULAR_YEARLY_FEE_CENTS` per year.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Unix epoch milliseconds.
pub type Timestamp = i64;

/// Minimum yearly fee for regular memberships, in euro cents.
pub const MIN_REGULAR_YEARLY_FEE_CENTS: i64 = 24_00;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Stable identifier of one membership application.
///
/// Mapped to a `TEXT` column by the custom SQL type adapters in `db::types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(Uuid);

impl ApplicationId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID, rejecting the nil value.
    pub fn from_uuid(uuid: Uuid) -> Result<Self, ApplicationValidationError> {
        if uuid.is_nil() {
            return Err(ApplicationValidationError::NilId);
        }
        Ok(Self(uuid))
    }

    /// Parses the hyphenated text form used in storage and logs.
    pub fn parse_str(value: &str) -> Result<Self, ApplicationValidationError> {
        let uuid = Uuid::parse_str(value.trim())
            .map_err(|_| ApplicationValidationError::InvalidId(value.to_string()))?;
        Self::from_uuid(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ApplicationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of membership applied for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipType {
    /// Voting member with the regular minimum fee.
    Regular,
    /// Supporting member without voting rights.
    Sustaining,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Sustaining => "sustaining",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "regular" => Some(Self::Regular),
            "sustaining" => Some(Self::Sustaining),
            _ => None,
        }
    }
}

/// How often the membership fee is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentInterval {
    Monthly,
    Quarterly,
    HalfYearly,
    Yearly,
}

impl PaymentInterval {
    /// Number of months covered by one payment.
    pub fn months(&self) -> u8 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::HalfYearly => 6,
            Self::Yearly => 12,
        }
    }

    pub fn from_months(months: i64) -> Option<Self> {
        match months {
            1 => Some(Self::Monthly),
            3 => Some(Self::Quarterly),
            6 => Some(Self::HalfYearly),
            12 => Some(Self::Yearly),
            _ => None,
        }
    }
}

/// Recurring membership fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipFee {
    /// Amount per payment in euro cents.
    pub amount_cents: i64,
    pub interval: PaymentInterval,
}

impl MembershipFee {
    pub fn new(amount_cents: i64, interval: PaymentInterval) -> Self {
        Self {
            amount_cents,
            interval,
        }
    }

    /// Amount paid over twelve months, in euro cents.
    ///
    /// `None` when the amount does not fit in `i64` cents.
    pub fn yearly_amount_cents(&self) -> Option<i64> {
        self.amount_cents
            .checked_mul(12)
            .map(|cents| cents / i64::from(self.interval.months()))
    }
}

/// Personal data of the person applying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub street: String,
    pub postal_code: String,
    pub city: String,
    /// ISO 3166-1 alpha-2 code.
    pub country_code: String,
    pub phone: Option<String>,
    /// ISO 8601 calendar date (`YYYY-MM-DD`).
    pub date_of_birth: Option<String>,
}

/// Validation errors for membership application records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplicationValidationError {
    NilId,
    InvalidId(String),
    EmptyField(&'static str),
    InvalidEmail(String),
    NonPositiveFee(i64),
    FeeOutOfRange(i64),
    FeeBelowMinimum { yearly_cents: i64, minimum_cents: i64 },
}

impl Display for ApplicationValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "application id must not be nil"),
            Self::InvalidId(value) => write!(f, "invalid application id `{value}`"),
            Self::EmptyField(field) => write!(f, "{field} must not be empty"),
            Self::InvalidEmail(value) => write!(f, "invalid email address `{value}`"),
            Self::NonPositiveFee(amount) => {
                write!(f, "fee amount must be positive, got {amount} cents")
            }
            Self::FeeOutOfRange(amount) => {
                write!(f, "fee amount {amount} cents exceeds the supported range")
            }
            Self::FeeBelowMinimum {
                yearly_cents,
                minimum_cents,
            } => write!(
                f,
                "yearly fee {yearly_cents} cents is below minimum {minimum_cents} cents"
            ),
        }
    }
}

impl Error for ApplicationValidationError {}

/// Canonical membership application record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipApplication {
    pub id: ApplicationId,
    pub applicant: Applicant,
    pub membership_type: MembershipType,
    pub fee: MembershipFee,
    pub needs_moderation: bool,
    pub is_cancelled: bool,
    pub is_confirmed: bool,
    pub created_at: Timestamp,
    /// Set when the application was handed to the membership administration.
    pub exported_at: Option<Timestamp>,
    /// Set by the personal data backup once the row has been exported.
    pub backup_at: Option<Timestamp>,
}

impl MembershipApplication {
    /// Creates a fresh application with a generated id.
    pub fn new(
        applicant: Applicant,
        membership_type: MembershipType,
        fee: MembershipFee,
        created_at: Timestamp,
    ) -> Self {
        Self::with_id(ApplicationId::new(), applicant, membership_type, fee, created_at)
    }

    /// Creates an application with a caller-provided id (imports, fixtures).
    pub fn with_id(
        id: ApplicationId,
        applicant: Applicant,
        membership_type: MembershipType,
        fee: MembershipFee,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            applicant,
            membership_type,
            fee,
            needs_moderation: false,
            is_cancelled: false,
            is_confirmed: false,
            created_at,
            exported_at: None,
            backup_at: None,
        }
    }

    /// Checks record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), ApplicationValidationError> {
        if self.id.is_nil() {
            return Err(ApplicationValidationError::NilId);
        }
        if self.applicant.first_name.trim().is_empty() {
            return Err(ApplicationValidationError::EmptyField("first_name"));
        }
        if self.applicant.last_name.trim().is_empty() {
            return Err(ApplicationValidationError::EmptyField("last_name"));
        }
        if !EMAIL_RE.is_match(self.applicant.email.trim()) {
            return Err(ApplicationValidationError::InvalidEmail(
                self.applicant.email.clone(),
            ));
        }
        if self.fee.amount_cents <= 0 {
            return Err(ApplicationValidationError::NonPositiveFee(
                self.fee.amount_cents,
            ));
        }
        let yearly_cents = self
            .fee
            .yearly_amount_cents()
            .ok_or(ApplicationValidationError::FeeOutOfRange(self.fee.amount_cents))?;
        if self.membership_type == MembershipType::Regular
            && yearly_cents < MIN_REGULAR_YEARLY_FEE_CENTS
        {
            return Err(ApplicationValidationError::FeeBelowMinimum {
                yearly_cents,
                minimum_cents: MIN_REGULAR_YEARLY_FEE_CENTS,
            });
        }
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.is_cancelled = true;
    }

    pub fn confirm(&mut self) {
        self.is_confirmed = true;
    }

    pub fn is_backed_up(&self) -> bool {
        self.backup_at.is_some()
    }
}

/// Current wall-clock time in epoch milliseconds.
///
/// Falls back to `0` if the system clock is before the epoch.
pub fn now_epoch_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as Timestamp)
}
