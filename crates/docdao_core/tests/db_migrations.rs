use docdao_core::db::migrations::latest_version;
use docdao_core::db::{open_db, open_db_in_memory, open_with_config, DbError};
use docdao_core::{
    CollectionRef, DocumentId, SqliteDocumentStore, StorageDriver, StoreConfig,
};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "documents");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docdao.db");

    let first = open_db(&path).unwrap();
    assert_eq!(schema_version(&first), latest_version());
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    assert_table_exists(&second, "documents");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn store_config_busy_timeout_is_applied() {
    let config = StoreConfig {
        path: None,
        busy_timeout_ms: 1234,
    };
    let conn = open_with_config(&config).unwrap();
    let timeout: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 1234);
}

#[test]
fn store_adopts_migrated_connection() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteDocumentStore::from_connection(conn).unwrap();
    assert_eq!(schema_version(store.connection()), latest_version());
}

#[test]
fn duplicate_keys_are_rejected_per_collection_only() {
    let conn = open_db_in_memory().unwrap();
    let insert = "INSERT INTO documents (collection, doc_key, body) VALUES (?1, 'k', '{}');";
    conn.execute(insert, ["customer"]).unwrap();
    conn.execute(insert, ["order"]).unwrap();
    assert!(conn.execute(insert, ["customer"]).is_err());
}

#[test]
fn version_one_rows_gain_a_key_field_on_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("v1.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            doc_key TEXT NOT NULL,
            body TEXT NOT NULL CHECK (json_valid(body)),
            created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000),
            updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000),
            UNIQUE (collection, doc_key)
        );
        INSERT INTO documents (collection, doc_key, body)
        VALUES ('customer', 'a', '{\"_id\":\"a\"}'),
               ('order', 'o-1', '{\"ref\":\"o-1\"}');
        PRAGMA user_version = 1;",
    )
    .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    let key_fields: Vec<String> = conn
        .prepare("SELECT key_field FROM documents ORDER BY seq;")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(key_fields, vec!["_id".to_string(), String::new()]);

    let store = SqliteDocumentStore::from_connection(conn).unwrap();
    let customers = CollectionRef::new("customer", "_id");
    let orders = CollectionRef::new("order", "ref");
    assert!(store
        .find_by_key(customers, &DocumentId::from("a"))
        .unwrap()
        .is_some());
    assert!(store
        .find_by_key(orders, &DocumentId::from("o-1"))
        .unwrap()
        .is_some());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
