//! Column type adapters for domain values.
//!
//! # Invariants
//! - `ApplicationId` is stored as hyphenated lowercase UUID text.
//! - `MembershipType` is stored as its snake_case name.
//! - `PaymentInterval` is stored as the number of months per payment.
//! - Unknown persisted values fail conversion; they never map to a default.

use crate::model::application::{ApplicationId, MembershipType, PaymentInterval};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Persisted value that does not decode into a domain type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidColumnValue {
    pub kind: &'static str,
    pub value: String,
}

impl Display for InvalidColumnValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} value `{}`", self.kind, self.value)
    }
}

impl Error for InvalidColumnValue {}

fn invalid(kind: &'static str, value: impl Into<String>) -> FromSqlError {
    FromSqlError::Other(Box::new(InvalidColumnValue {
        kind,
        value: value.into(),
    }))
}

impl ToSql for ApplicationId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for ApplicationId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        ApplicationId::parse_str(text).map_err(|_| invalid("application id", text))
    }
}

impl ToSql for MembershipType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MembershipType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        MembershipType::parse(text).ok_or_else(|| invalid("membership type", text))
    }
}

impl ToSql for PaymentInterval {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.months())))
    }
}

impl FromSql for PaymentInterval {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let months = value.as_i64()?;
        PaymentInterval::from_months(months).ok_or(FromSqlError::OutOfRange(months))
    }
}
