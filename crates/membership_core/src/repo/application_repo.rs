//! Membership application repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the `membership_applications` table.
//! - Keep an in-process identity cache of loaded applications.
//! - Serve the bulk backup-marking contract used by the personal data backup.
//!
//! # Invariants
//! - Write paths call `MembershipApplication::validate()` before SQL mutations.
//! - Create refreshes the identity cache entry; update evicts it.
//! - Only the bulk backup mark writes `backup_at` after creation.
//! - Bulk mutations bypass the identity cache; callers must clear it.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::backup::orchestrator::APPLICATIONS_TABLE;
use crate::backup::store::BackupMarkingStore;
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::application::{
    Applicant, ApplicationId, ApplicationValidationError, MembershipApplication, MembershipFee,
    Timestamp,
};
use log::debug;
use rusqlite::types::{FromSql, Value};
use rusqlite::{params, params_from_iter, Connection, Row};
use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const REQUIRED_COLUMNS: &[&str] = &[
    "uuid",
    "first_name",
    "last_name",
    "email",
    "street",
    "postal_code",
    "city",
    "country_code",
    "phone",
    "date_of_birth",
    "membership_type",
    "fee_amount_cents",
    "payment_interval_months",
    "needs_moderation",
    "is_cancelled",
    "is_confirmed",
    "created_at",
    "exported_at",
    "backup_at",
];

const APPLICATION_SELECT_SQL: &str = "SELECT
    uuid,
    first_name,
    last_name,
    email,
    street,
    postal_code,
    city,
    country_code,
    phone,
    date_of_birth,
    membership_type,
    fee_amount_cents,
    payment_interval_months,
    needs_moderation,
    is_cancelled,
    is_confirmed,
    created_at,
    exported_at,
    backup_at
FROM membership_applications";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for application persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ApplicationValidationError),
    Db(DbError),
    NotFound(ApplicationId),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Identity cache is borrowed elsewhere and cannot be mutated.
    CacheUnavailable,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "membership application not found: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted application data: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}; open it through db::open_db"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table missing: {table}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column missing: {table}.{column}")
            }
            Self::CacheUnavailable => write!(f, "identity cache is currently borrowed"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ApplicationValidationError> for RepoError {
    fn from(value: ApplicationValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing applications.
#[derive(Debug, Clone, Default)]
pub struct ApplicationListQuery {
    pub include_cancelled: bool,
    /// Only applications whose personal data was never backed up.
    pub pending_backup_only: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for membership application CRUD operations.
pub trait ApplicationRepository {
    fn create_application(&self, application: &MembershipApplication)
        -> RepoResult<ApplicationId>;
    /// Persists every mutable field except `backup_at`, which only the
    /// backup run writes.
    fn update_application(&self, application: &MembershipApplication) -> RepoResult<()>;
    fn get_application(&self, id: ApplicationId) -> RepoResult<Option<MembershipApplication>>;
    fn list_applications(
        &self,
        query: &ApplicationListQuery,
    ) -> RepoResult<Vec<MembershipApplication>>;
    fn count_pending_backup(&self) -> RepoResult<u64>;
}

impl<R: ApplicationRepository + ?Sized> ApplicationRepository for &R {
    fn create_application(
        &self,
        application: &MembershipApplication,
    ) -> RepoResult<ApplicationId> {
        (**self).create_application(application)
    }

    fn update_application(&self, application: &MembershipApplication) -> RepoResult<()> {
        (**self).update_application(application)
    }

    fn get_application(&self, id: ApplicationId) -> RepoResult<Option<MembershipApplication>> {
        (**self).get_application(id)
    }

    fn list_applications(
        &self,
        query: &ApplicationListQuery,
    ) -> RepoResult<Vec<MembershipApplication>> {
        (**self).list_applications(query)
    }

    fn count_pending_backup(&self) -> RepoResult<u64> {
        (**self).count_pending_backup()
    }
}

/// SQLite-backed application repository with an identity cache.
///
/// `get_application` returns the cached copy of a previously loaded or
/// written record. The cache is per repository instance and not `Sync`.
pub struct SqliteApplicationRepository<'conn> {
    conn: &'conn Connection,
    identity_cache: RefCell<HashMap<ApplicationId, MembershipApplication>>,
}

impl<'conn> SqliteApplicationRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations were not applied.
    /// - `MissingRequiredTable`/`MissingRequiredColumn` for foreign schemas.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self {
            conn,
            identity_cache: RefCell::new(HashMap::new()),
        })
    }

    /// Number of applications currently held by the identity cache.
    pub fn cached_len(&self) -> usize {
        self.identity_cache
            .try_borrow()
            .map_or(0, |cache| cache.len())
    }

    /// Total number of stored applications, cancelled ones included.
    pub fn count_applications(&self) -> RepoResult<u64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM membership_applications;",
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn remember(&self, application: &MembershipApplication) {
        if let Ok(mut cache) = self.identity_cache.try_borrow_mut() {
            cache.insert(application.id, application.clone());
        }
    }

    fn forget(&self, id: ApplicationId) {
        if let Ok(mut cache) = self.identity_cache.try_borrow_mut() {
            cache.remove(&id);
        }
    }

    fn cached(&self, id: ApplicationId) -> Option<MembershipApplication> {
        self.identity_cache
            .try_borrow()
            .ok()
            .and_then(|cache| cache.get(&id).cloned())
    }
}

impl ApplicationRepository for SqliteApplicationRepository<'_> {
    fn create_application(
        &self,
        application: &MembershipApplication,
    ) -> RepoResult<ApplicationId> {
        application.validate()?;

        let applicant = &application.applicant;
        self.conn.execute(
            "INSERT INTO membership_applications (
                uuid,
                first_name,
                last_name,
                email,
                street,
                postal_code,
                city,
                country_code,
                phone,
                date_of_birth,
                membership_type,
                fee_amount_cents,
                payment_interval_months,
                needs_moderation,
                is_cancelled,
                is_confirmed,
                created_at,
                exported_at,
                backup_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19);",
            params![
                application.id,
                applicant.first_name.as_str(),
                applicant.last_name.as_str(),
                applicant.email.as_str(),
                applicant.street.as_str(),
                applicant.postal_code.as_str(),
                applicant.city.as_str(),
                applicant.country_code.as_str(),
                applicant.phone.as_deref(),
                applicant.date_of_birth.as_deref(),
                application.membership_type,
                application.fee.amount_cents,
                application.fee.interval,
                application.needs_moderation,
                application.is_cancelled,
                application.is_confirmed,
                application.created_at,
                application.exported_at,
                application.backup_at,
            ],
        )?;

        self.remember(application);
        Ok(application.id)
    }

    fn update_application(&self, application: &MembershipApplication) -> RepoResult<()> {
        application.validate()?;

        let applicant = &application.applicant;
        let changed = self.conn.execute(
            "UPDATE membership_applications
             SET
                first_name = ?1,
                last_name = ?2,
                email = ?3,
                street = ?4,
                postal_code = ?5,
                city = ?6,
                country_code = ?7,
                phone = ?8,
                date_of_birth = ?9,
                membership_type = ?10,
                fee_amount_cents = ?11,
                payment_interval_months = ?12,
                needs_moderation = ?13,
                is_cancelled = ?14,
                is_confirmed = ?15,
                exported_at = ?16,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?17;",
            params![
                applicant.first_name.as_str(),
                applicant.last_name.as_str(),
                applicant.email.as_str(),
                applicant.street.as_str(),
                applicant.postal_code.as_str(),
                applicant.city.as_str(),
                applicant.country_code.as_str(),
                applicant.phone.as_deref(),
                applicant.date_of_birth.as_deref(),
                application.membership_type,
                application.fee.amount_cents,
                application.fee.interval,
                application.needs_moderation,
                application.is_cancelled,
                application.is_confirmed,
                application.exported_at,
                application.id,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(application.id));
        }

        // `backup_at` is owned by the backup run; reload it on next read.
        self.forget(application.id);
        Ok(())
    }

    fn get_application(&self, id: ApplicationId) -> RepoResult<Option<MembershipApplication>> {
        if let Some(application) = self.cached(id) {
            return Ok(Some(application));
        }

        let mut stmt = self
            .conn
            .prepare(&format!("{APPLICATION_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            let application = parse_application_row(row)?;
            self.remember(&application);
            return Ok(Some(application));
        }

        Ok(None)
    }

    fn list_applications(
        &self,
        query: &ApplicationListQuery,
    ) -> RepoResult<Vec<MembershipApplication>> {
        let mut sql = format!("{APPLICATION_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_cancelled {
            sql.push_str(" AND is_cancelled = 0");
        }
        if query.pending_backup_only {
            sql.push_str(" AND backup_at IS NULL");
        }

        sql.push_str(" ORDER BY created_at DESC, uuid ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut applications = Vec::new();
        while let Some(row) = rows.next()? {
            applications.push(parse_application_row(row)?);
        }

        Ok(applications)
    }

    fn count_pending_backup(&self) -> RepoResult<u64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM membership_applications WHERE backup_at IS NULL;",
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

impl BackupMarkingStore for SqliteApplicationRepository<'_> {
    fn mark_unbacked_up(&self, as_of: Timestamp) -> RepoResult<usize> {
        let affected = self.conn.execute(
            "UPDATE membership_applications
             SET backup_at = ?1
             WHERE backup_at IS NULL;",
            [as_of],
        )?;
        debug!("event=backup_mark module=repo status=ok affected={affected}");
        Ok(affected)
    }

    fn clear_identity_cache(&self) -> RepoResult<()> {
        let mut cache = self
            .identity_cache
            .try_borrow_mut()
            .map_err(|_| RepoError::CacheUnavailable)?;
        let evicted = cache.len();
        cache.clear();
        debug!("event=identity_cache_clear module=repo status=ok evicted={evicted}");
        Ok(())
    }
}

fn ensure_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
        );",
        [APPLICATIONS_TABLE],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Err(RepoError::MissingRequiredTable(APPLICATIONS_TABLE));
    }

    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1);")?;
    let columns = stmt
        .query_map([APPLICATIONS_TABLE], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for &column in REQUIRED_COLUMNS {
        if !columns.iter().any(|name| name == column) {
            return Err(RepoError::MissingRequiredColumn {
                table: APPLICATIONS_TABLE,
                column,
            });
        }
    }

    Ok(())
}

fn parse_application_row(row: &Row<'_>) -> RepoResult<MembershipApplication> {
    let application = MembershipApplication {
        id: get_column(row, "uuid")?,
        applicant: Applicant {
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get("email")?,
            street: row.get("street")?,
            postal_code: row.get("postal_code")?,
            city: row.get("city")?,
            country_code: row.get("country_code")?,
            phone: row.get("phone")?,
            date_of_birth: row.get("date_of_birth")?,
        },
        membership_type: get_column(row, "membership_type")?,
        fee: MembershipFee::new(
            row.get("fee_amount_cents")?,
            get_column(row, "payment_interval_months")?,
        ),
        needs_moderation: get_column(row, "needs_moderation")?,
        is_cancelled: get_column(row, "is_cancelled")?,
        is_confirmed: get_column(row, "is_confirmed")?,
        created_at: row.get("created_at")?,
        exported_at: row.get("exported_at")?,
        backup_at: row.get("backup_at")?,
    };
    application.validate()?;
    Ok(application)
}

/// Reads one column through its type adapter, reporting bad values as
/// `InvalidData` instead of transport errors.
fn get_column<T: FromSql>(row: &Row<'_>, column: &'static str) -> RepoResult<T> {
    row.get::<_, T>(column).map_err(|err| match err {
        rusqlite::Error::FromSqlConversionFailure(_, _, source) => RepoError::InvalidData(
            format!("{source} in {APPLICATIONS_TABLE}.{column}"),
        ),
        rusqlite::Error::IntegralValueOutOfRange(_, value) => RepoError::InvalidData(format!(
            "out of range value `{value}` in {APPLICATIONS_TABLE}.{column}"
        )),
        other => RepoError::from(other),
    })
}
