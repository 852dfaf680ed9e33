use athena_core::db::migrations::latest_version;
use athena_core::db::{open_db, open_db_in_memory, DbError};
use athena_core::store::KEY_ACTIVE_USER;
use athena_core::{
    KeyValueStore, KvProfileRepository, ProfileRepository, SqliteKeyValueStore, StoreError,
    UserIdentity, UserProfile,
};
use rusqlite::Connection;
use uuid::Uuid;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "kv_entries");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("athena.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "kv_entries");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn opening_store_in_missing_directory_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("athena.db");

    match open_db(&path).unwrap_err() {
        DbError::Open { path: failed, .. } => assert_eq!(failed, path),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn sqlite_store_upserts_and_removes() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteKeyValueStore::new(&conn);

    assert_eq!(store.get("athena_theme").unwrap(), None);
    store.set("athena_theme", "dark").unwrap();
    store.set("athena_theme", "light").unwrap();
    assert_eq!(store.get("athena_theme").unwrap().as_deref(), Some("light"));
    assert_eq!(store.keys().unwrap(), vec!["athena_theme".to_string()]);

    store.remove("athena_theme").unwrap();
    store.remove("athena_theme").unwrap();
    assert_eq!(store.get("athena_theme").unwrap(), None);
}

#[test]
fn sqlite_store_rejects_blank_keys() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteKeyValueStore::new(&conn);

    assert!(matches!(store.set("  ", "x"), Err(StoreError::InvalidKey)));
    assert!(matches!(store.get(""), Err(StoreError::InvalidKey)));
}

#[test]
fn schema_guard_rejects_blank_keys_written_directly() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO kv_entries (key, value) VALUES ('   ', 'x');",
        [],
    );
    assert!(result.is_err());
}

#[test]
fn profile_survives_reopening_the_store_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("athena.db");
    let identity = UserIdentity {
        id: Uuid::new_v4(),
        username: "reader".to_string(),
        email: "reader@example.com".to_string(),
    };
    let mut profile = UserProfile::new_account(identity, 750, [1, 2, 3]);
    profile.add_favorite(2);

    {
        let conn = open_db(&path).unwrap();
        let store = SqliteKeyValueStore::new(&conn);
        KvProfileRepository::new(&store).save(&profile).unwrap();
    }

    let conn = open_db(&path).unwrap();
    let store = SqliteKeyValueStore::new(&conn);
    let repo = KvProfileRepository::new(&store);
    assert_eq!(repo.try_load().unwrap(), Some(profile));

    let raw = store.get(KEY_ACTIVE_USER).unwrap().unwrap();
    assert!(raw.contains("\"unlockedBooks\":[1,2,3]"));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "expected table `{table_name}` to exist");
}
