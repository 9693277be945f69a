use membership_core::backup::BackupMarkingStore;
use membership_core::db::migrations::latest_version;
use membership_core::db::open_db_in_memory;
use membership_core::{
    Applicant, ApplicationId, ApplicationListQuery, ApplicationRepository, MembershipApplication,
    MembershipFee, MembershipType, PaymentInterval, RepoError, SqliteApplicationRepository,
};
use rusqlite::Connection;

fn applicant(first_name: &str) -> Applicant {
    Applicant {
        first_name: first_name.to_string(),
        last_name: "Tester".to_string(),
        email: format!("{}@example.org", first_name.to_lowercase()),
        street: "Tempelhofer Ufer 23".to_string(),
        postal_code: "10963".to_string(),
        city: "Berlin".to_string(),
        country_code: "DE".to_string(),
        phone: Some("+49 30 123456".to_string()),
        date_of_birth: None,
    }
}

fn application(first_name: &str, created_at: i64) -> MembershipApplication {
    MembershipApplication::new(
        applicant(first_name),
        MembershipType::Regular,
        MembershipFee::new(1000, PaymentInterval::Quarterly),
        created_at,
    )
}

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let stored = application("Ada", 10);
    let id = repo.create_application(&stored).unwrap();

    let loaded = repo.get_application(id).unwrap().unwrap();
    assert_eq!(loaded, stored);
}

#[test]
fn fresh_repository_reads_persisted_columns() {
    let conn = open_db_in_memory().unwrap();
    let mut stored = application("Ada", 10);
    stored.fee = MembershipFee::new(2500, PaymentInterval::HalfYearly);
    stored.membership_type = MembershipType::Sustaining;
    stored.exported_at = Some(20);
    SqliteApplicationRepository::try_new(&conn)
        .unwrap()
        .create_application(&stored)
        .unwrap();

    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    assert_eq!(repo.cached_len(), 0);
    let loaded = repo.get_application(stored.id).unwrap().unwrap();
    assert_eq!(loaded, stored);
    assert_eq!(repo.cached_len(), 1);
}

#[test]
fn update_existing_application() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let mut stored = application("Ada", 10);
    repo.create_application(&stored).unwrap();

    stored.applicant.city = "Hamburg".to_string();
    stored.confirm();
    repo.update_application(&stored).unwrap();

    let other_repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    let loaded = other_repo.get_application(stored.id).unwrap().unwrap();
    assert_eq!(loaded.applicant.city, "Hamburg");
    assert!(loaded.is_confirmed);
}

#[test]
fn update_not_found_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let missing = application("Ghost", 10);
    let err = repo.update_application(&missing).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(id) if id == missing.id));
}

#[test]
fn validation_failure_blocks_create_and_update() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let mut invalid = application("Ada", 10);
    invalid.applicant.email = "nope".to_string();
    let create_err = repo.create_application(&invalid).unwrap_err();
    assert!(matches!(create_err, RepoError::Validation(_)));

    let mut valid = application("Bob", 10);
    repo.create_application(&valid).unwrap();
    valid.fee = MembershipFee::new(-5, PaymentInterval::Monthly);
    let update_err = repo.update_application(&valid).unwrap_err();
    assert!(matches!(update_err, RepoError::Validation(_)));
}

#[test]
fn get_unknown_id_returns_none() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    assert!(repo.get_application(ApplicationId::new()).unwrap().is_none());
}

#[test]
fn list_hides_cancelled_and_filters_pending_backup() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let active = application("Ada", 30);
    let mut cancelled = application("Bob", 20);
    cancelled.cancel();
    let mut backed_up = application("Cy", 10);
    backed_up.backup_at = Some(5);
    for item in [&active, &cancelled, &backed_up] {
        repo.create_application(item).unwrap();
    }

    let visible: Vec<_> = repo
        .list_applications(&ApplicationListQuery::default())
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(visible, [active.id, backed_up.id]);

    let pending_query = ApplicationListQuery {
        include_cancelled: true,
        pending_backup_only: true,
        ..ApplicationListQuery::default()
    };
    let pending: Vec<_> = repo
        .list_applications(&pending_query)
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect();
    assert_eq!(pending, [active.id, cancelled.id]);
    assert_eq!(repo.count_pending_backup().unwrap(), 2);
    assert_eq!(repo.count_applications().unwrap(), 3);
}

#[test]
fn list_pagination_follows_creation_order() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let newest = application("Ada", 300);
    let middle = application("Bob", 200);
    let oldest = application("Cy", 100);
    for item in [&oldest, &newest, &middle] {
        repo.create_application(item).unwrap();
    }

    let page = |limit: Option<u32>, offset: u32| {
        repo.list_applications(&ApplicationListQuery {
            limit,
            offset,
            ..ApplicationListQuery::default()
        })
        .unwrap()
        .into_iter()
        .map(|item| item.id)
        .collect::<Vec<_>>()
    };

    assert_eq!(page(Some(2), 0), [newest.id, middle.id]);
    assert_eq!(page(Some(2), 2), [oldest.id]);
    assert_eq!(page(None, 1), [middle.id, oldest.id]);
}

#[test]
fn identity_cache_is_stale_after_bulk_mark_until_cleared() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let stored = application("Ada", 10);
    repo.create_application(&stored).unwrap();

    assert_eq!(repo.mark_unbacked_up(777).unwrap(), 1);
    let cached = repo.get_application(stored.id).unwrap().unwrap();
    assert_eq!(cached.backup_at, None);

    repo.clear_identity_cache().unwrap();
    assert_eq!(repo.cached_len(), 0);
    let reloaded = repo.get_application(stored.id).unwrap().unwrap();
    assert_eq!(reloaded.backup_at, Some(777));
}

#[test]
fn update_of_copy_loaded_before_backup_keeps_backup_mark() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let stored = application("Ada", 10);
    repo.create_application(&stored).unwrap();
    let mut held = repo.get_application(stored.id).unwrap().unwrap();

    assert_eq!(repo.mark_unbacked_up(99).unwrap(), 1);
    repo.clear_identity_cache().unwrap();

    held.confirm();
    repo.update_application(&held).unwrap();

    assert_eq!(repo.count_pending_backup().unwrap(), 0);
    let reloaded = repo.get_application(stored.id).unwrap().unwrap();
    assert!(reloaded.is_confirmed);
    assert_eq!(reloaded.backup_at, Some(99));
}

#[test]
fn update_through_repository_with_stale_cache_keeps_backup_mark() {
    let conn = open_db_in_memory().unwrap();
    let backup_repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    let other_repo = SqliteApplicationRepository::try_new(&conn).unwrap();

    let stored = application("Ada", 10);
    backup_repo.create_application(&stored).unwrap();
    let mut stale = other_repo.get_application(stored.id).unwrap().unwrap();

    assert_eq!(backup_repo.mark_unbacked_up(99).unwrap(), 1);
    backup_repo.clear_identity_cache().unwrap();

    stale.cancel();
    other_repo.update_application(&stale).unwrap();

    assert_eq!(other_repo.count_pending_backup().unwrap(), 0);
    let reloaded = other_repo.get_application(stored.id).unwrap().unwrap();
    assert!(reloaded.is_cancelled);
    assert_eq!(reloaded.backup_at, Some(99));
}

#[test]
fn invalid_persisted_interval_is_reported_as_invalid_data() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteApplicationRepository::try_new(&conn).unwrap();
    let stored = application("Ada", 10);
    repo.create_application(&stored).unwrap();

    conn.execute_batch(
        "PRAGMA ignore_check_constraints = ON;
         UPDATE membership_applications SET payment_interval_months = 7;",
    )
    .unwrap();

    let fresh = SqliteApplicationRepository::try_new(&conn).unwrap();
    let err = fresh.get_application(stored.id).unwrap_err();
    match err {
        RepoError::InvalidData(message) => {
            assert!(message.contains("payment_interval_months"), "{message}")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repository_rejects_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    match SqliteApplicationRepository::try_new(&conn) {
        Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version: 0,
        }) => assert_eq!(expected_version, latest_version()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected uninitialized connection error"),
    }
}

#[test]
fn repository_rejects_connection_without_applications_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    assert!(matches!(
        SqliteApplicationRepository::try_new(&conn),
        Err(RepoError::MissingRequiredTable("membership_applications"))
    ));
}

#[test]
fn repository_rejects_connection_missing_backup_column() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE membership_applications (
            uuid TEXT PRIMARY KEY NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL,
            street TEXT NOT NULL,
            postal_code TEXT NOT NULL,
            city TEXT NOT NULL,
            country_code TEXT NOT NULL,
            phone TEXT,
            date_of_birth TEXT,
            membership_type TEXT NOT NULL,
            fee_amount_cents INTEGER NOT NULL,
            payment_interval_months INTEGER NOT NULL,
            needs_moderation INTEGER NOT NULL,
            is_cancelled INTEGER NOT NULL,
            is_confirmed INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            exported_at INTEGER
        );",
    )
    .unwrap();
    conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version()))
        .unwrap();

    assert!(matches!(
        SqliteApplicationRepository::try_new(&conn),
        Err(RepoError::MissingRequiredColumn {
            table: "membership_applications",
            column: "backup_at"
        })
    ));
}
