use membership_core::backup::{
    pending_applications_target, BackupClient, BackupClientError, BackupError,
    BackupMarkingStore, BackupPlan, BackupTarget, PersonalDataBackup, APPLICATIONS_TABLE,
    PENDING_BACKUP_FILTER,
};
use membership_core::db::open_db_in_memory;
use membership_core::{
    Applicant, ApplicationListQuery, ApplicationRepository, MembershipApplication, MembershipFee,
    MembershipType, PaymentInterval, RepoResult, SqliteApplicationRepository, Timestamp,
};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};

const BACKUP_TIME: Timestamp = 1_760_000_000_000;
const EARLIER_BACKUP_TIME: Timestamp = 1_700_000_000_000;

/// Records every exported plan; optionally fails.
#[derive(Default)]
struct RecordingClient {
    fail: bool,
    plans: RefCell<Vec<BackupPlan>>,
}

impl RecordingClient {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn export_count(&self) -> usize {
        self.plans.borrow().len()
    }
}

impl BackupClient for RecordingClient {
    fn export(&self, plan: &BackupPlan) -> Result<(), BackupClientError> {
        self.plans.borrow_mut().push(plan.clone());
        if self.fail {
            return Err(BackupClientError::with_source(
                "dump failed",
                std::io::Error::other("broken pipe"),
            ));
        }
        Ok(())
    }
}

/// Wraps the SQLite store and counts mutation calls.
struct CountingStore<'a> {
    inner: &'a SqliteApplicationRepository<'a>,
    mark_calls: Cell<usize>,
}

impl BackupMarkingStore for CountingStore<'_> {
    fn mark_unbacked_up(&self, as_of: Timestamp) -> RepoResult<usize> {
        self.mark_calls.set(self.mark_calls.get() + 1);
        self.inner.mark_unbacked_up(as_of)
    }

    fn clear_identity_cache(&self) -> RepoResult<()> {
        self.inner.clear_identity_cache()
    }
}

fn application(index: usize) -> MembershipApplication {
    MembershipApplication::new(
        Applicant {
            first_name: format!("Member{index}"),
            last_name: "Backup".to_string(),
            email: format!("member{index}@example.org"),
            street: "Tempelhofer Ufer 23".to_string(),
            postal_code: "10963".to_string(),
            city: "Berlin".to_string(),
            country_code: "DE".to_string(),
            phone: None,
            date_of_birth: None,
        },
        MembershipType::Regular,
        MembershipFee::new(2400, PaymentInterval::Yearly),
        index as Timestamp,
    )
}

/// Seeds `unset` applications without backup and `set` already backed up.
fn seed(
    repo: &SqliteApplicationRepository<'_>,
    unset: usize,
    set: usize,
) -> Vec<MembershipApplication> {
    let mut seeded = Vec::new();
    for index in 0..unset + set {
        let mut item = application(index);
        if index >= unset {
            item.backup_at = Some(EARLIER_BACKUP_TIME);
        }
        repo.create_application(&item).unwrap();
        seeded.push(item);
    }
    seeded
}

fn backup_column(conn: &Connection) -> Vec<Option<Timestamp>> {
    let mut stmt = conn
        .prepare("SELECT backup_at FROM membership_applications ORDER BY created_at ASC;")
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn failed_export_never_invokes_mutation() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    seed(&repo, 3, 0);
    let store = CountingStore {
        inner: &repo,
        mark_calls: Cell::new(0),
    };
    let client = RecordingClient::failing();

    let err = PersonalDataBackup::new(&client, &store)
        .run_backup(BACKUP_TIME)
        .unwrap_err();

    assert!(matches!(err, BackupError::Export(_)));
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(client.export_count(), 1);
    assert_eq!(store.mark_calls.get(), 0);
    assert_eq!(backup_column(&conn), [None, None, None]);
}

#[test]
fn second_run_with_same_timestamp_marks_nothing() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    seed(&repo, 4, 0);
    let client = RecordingClient::default();
    let backup = PersonalDataBackup::new(&client, &repo);

    assert_eq!(backup.run_backup(BACKUP_TIME).unwrap(), 4);
    assert_eq!(backup.run_backup(BACKUP_TIME).unwrap(), 0);
    assert_eq!(client.export_count(), 2);
    assert_eq!(repo.count_pending_backup().unwrap(), 0);
}

#[test]
fn already_backed_up_rows_keep_their_timestamp() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    seed(&repo, 2, 2);

    PersonalDataBackup::new(RecordingClient::default(), &repo)
        .run_backup(BACKUP_TIME)
        .unwrap();

    assert_eq!(
        backup_column(&conn),
        [
            Some(BACKUP_TIME),
            Some(BACKUP_TIME),
            Some(EARLIER_BACKUP_TIME),
            Some(EARLIER_BACKUP_TIME),
        ]
    );
}

#[test]
fn records_loaded_before_the_run_read_back_with_new_timestamp() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    let seeded = seed(&repo, 2, 0);
    let before = repo.get_application(seeded[0].id).unwrap().unwrap();
    assert_eq!(before.backup_at, None);
    assert!(repo.cached_len() > 0);

    PersonalDataBackup::new(RecordingClient::default(), &repo)
        .run_backup(BACKUP_TIME)
        .unwrap();

    assert_eq!(repo.cached_len(), 0);
    let after = repo.get_application(seeded[0].id).unwrap().unwrap();
    assert_eq!(after.backup_at, Some(BACKUP_TIME));
}

#[test]
fn returns_number_of_newly_marked_records() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    seed(&repo, 5, 3);

    let affected = PersonalDataBackup::new(RecordingClient::default(), &repo)
        .run_backup(BACKUP_TIME)
        .unwrap();

    assert_eq!(affected, 5);
    let column = backup_column(&conn);
    assert_eq!(
        column.iter().filter(|value| **value == Some(BACKUP_TIME)).count(),
        5
    );
    assert_eq!(
        column
            .iter()
            .filter(|value| **value == Some(EARLIER_BACKUP_TIME))
            .count(),
        3
    );
}

#[test]
fn empty_store_still_exports_and_returns_zero() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    seed(&repo, 0, 2);
    let client = RecordingClient::default();

    let affected = PersonalDataBackup::new(&client, &repo)
        .run_backup(BACKUP_TIME)
        .unwrap();

    assert_eq!(affected, 0);
    assert_eq!(client.export_count(), 1);
    let plans = client.plans.borrow();
    assert_eq!(
        plans[0].targets(),
        [BackupTarget::new(APPLICATIONS_TABLE, PENDING_BACKUP_FILTER)]
    );
}

#[test]
fn exported_filter_selects_exactly_the_rows_that_get_marked() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    seed(&repo, 3, 2);
    let client = RecordingClient::default();
    let backup = PersonalDataBackup::new(&client, &repo);

    let target = pending_applications_target();
    let exported: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {};",
                target.table_name(),
                target.filter_expression()
            ),
            [],
            |row| row.get(0),
        )
        .unwrap();

    assert_eq!(backup.run_backup(BACKUP_TIME).unwrap() as i64, exported);
    let pending = repo
        .list_applications(&ApplicationListQuery {
            pending_backup_only: true,
            ..ApplicationListQuery::default()
        })
        .unwrap();
    assert!(pending.is_empty());
}
