#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use sqlgate::{ConnectionDescriptor, FailureKind, MemorySink, QueryExecutor, SqlValue, SqliteDriver};
use std::sync::Arc;
use tempfile::TempDir;

fn setup_db() -> (TempDir, ConnectionDescriptor) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identity.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
         INSERT INTO users (name) VALUES ('alice'), ('bob'), ('carol');
         DELETE FROM users WHERE name IN ('bob', 'carol');",
    )
    .unwrap();
    (dir, ConnectionDescriptor::from(path.as_path()))
}

fn executor() -> (QueryExecutor<SqliteDriver>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (QueryExecutor::new(SqliteDriver::new(), sink.clone()), sink)
}

fn next_id(executor: &QueryExecutor<SqliteDriver>, descriptor: &ConnectionDescriptor) -> SqlValue {
    executor
        .execute_batch("INSERT INTO users (name) VALUES ('new')", &[], descriptor)
        .unwrap();
    executor
        .execute_to_row("SELECT id FROM users WHERE name = 'new'", descriptor, None)
        .unwrap()
        .unwrap()
        .get("id")
        .cloned()
        .unwrap()
}

fn stored_sequence(descriptor: &ConnectionDescriptor) -> i64 {
    rusqlite::Connection::open(descriptor.as_str())
        .unwrap()
        .query_row("SELECT seq FROM sqlite_sequence WHERE name = 'users'", [], |row| row.get(0))
        .unwrap()
}

fn rewind_sequence(descriptor: &ConnectionDescriptor) {
    rusqlite::Connection::open(descriptor.as_str())
        .unwrap()
        .execute("UPDATE sqlite_sequence SET seq = 0 WHERE name = 'users'", [])
        .unwrap();
}

#[test]
fn test_reset_never_reuses_deleted_ids() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    executor.reset_identity("users", &descriptor).unwrap();
    assert_eq!(stored_sequence(&descriptor), 3);
    assert_eq!(next_id(&executor, &descriptor), SqlValue::Integer(4));
    assert!(sink.is_empty());
}

#[test]
fn test_reset_raises_sequence_behind_max() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();
    rewind_sequence(&descriptor);

    executor.reset_identity("users", &descriptor).unwrap();
    assert_eq!(stored_sequence(&descriptor), 1);
    assert!(sink.is_empty());
}

#[test]
fn test_schema_qualified_table() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();
    rewind_sequence(&descriptor);

    executor.reset_identity("main.users", &descriptor).unwrap();
    assert_eq!(stored_sequence(&descriptor), 1);
}

#[test]
fn test_injection_attempt_rejected_without_sql() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    for hostile in ["users; DROP TABLE users", "users'--", "a.b.c", "1users", ""] {
        let err = executor.reset_identity(hostile, &descriptor).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Execution);
    }
    assert_eq!(sink.errors().len(), 5);

    let survivors = executor
        .execute_to_table("SELECT id FROM users", &descriptor)
        .unwrap();
    assert_eq!(survivors.len(), 1);
}

#[test]
fn test_unknown_table_is_execution_failure() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor.reset_identity("ghosts", &descriptor).unwrap_err();
    assert_eq!(err.kind(), FailureKind::Execution);
    assert_eq!(sink.errors()[0].title.as_deref(), Some("reset_identity"));
}
