#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgate::{
    ColumnType, ConnectionDescriptor, ExecutionOutcome, FailureKind, MemorySink, QueryExecutor,
    QueryRequest, ResultShape, Sentinel, SqlValue, SqliteDriver,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn setup_db() -> (TempDir, ConnectionDescriptor) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
         INSERT INTO users (name) VALUES ('alice');",
    )
    .unwrap();
    (dir, ConnectionDescriptor::from(path.as_path()))
}

fn executor() -> (QueryExecutor<SqliteDriver>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    (QueryExecutor::new(SqliteDriver::new(), sink.clone()), sink)
}

#[test]
fn test_validate_reachable_database() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();
    assert!(executor.validate(&descriptor));
    assert!(sink.is_empty());
}

#[test]
fn test_validate_missing_file_reports_one_error() {
    let dir = TempDir::new().unwrap();
    let descriptor = ConnectionDescriptor::from(dir.path().join("nope.db").as_path());
    let (executor, sink) = executor();

    assert!(!executor.validate(&descriptor));
    assert_eq!(sink.len(), 1);
    assert_eq!(sink.errors()[0].kind, Some(FailureKind::Connection));
}

#[test]
fn test_validate_rejects_file_that_is_not_a_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "plain text, not sqlite\n".repeat(64)).unwrap();
    let descriptor = ConnectionDescriptor::from(path.as_path());
    let (executor, sink) = executor();

    assert!(!executor.validate(&descriptor));
    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, Some(FailureKind::Connection));
}

#[test]
fn test_execute_to_table_rows_and_schema() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let table = executor
        .execute_to_table("SELECT id, name FROM users", &descriptor)
        .unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.schema().names().collect::<Vec<_>>(), vec!["id", "name"]);
    assert_eq!(table.schema().columns()[0].column_type, ColumnType::Integer);
    assert_eq!(table.to_json(), json!([{"id": 1, "name": "alice"}]));
    assert!(sink.is_empty());
}

#[test]
fn test_reads_are_idempotent() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    let first = executor
        .execute_to_table("SELECT * FROM users ORDER BY id", &descriptor)
        .unwrap();
    let second = executor
        .execute_to_table("SELECT * FROM users ORDER BY id", &descriptor)
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_execute_to_row_present_and_absent() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let row = executor
        .execute_to_row("SELECT id, name FROM users WHERE id = 1", &descriptor, None)
        .unwrap()
        .unwrap();
    assert_eq!(row.get("id"), Some(&SqlValue::Integer(1)));
    assert_eq!(row.get("name"), Some(&SqlValue::Text("alice".into())));
    assert_eq!(row.to_json(), json!({"id": 1, "name": "alice"}));

    let missing = executor
        .execute_to_row("SELECT id, name FROM users WHERE id = 42", &descriptor, None)
        .unwrap();
    assert_eq!(missing, None);
    assert!(sink.is_empty());
}

#[test]
fn test_execute_to_row_stops_after_first_row() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();
    executor
        .execute_batch("INSERT INTO users (name) VALUES ('bob'), ('carol')", &[], &descriptor)
        .unwrap();

    let row = executor
        .execute_to_row("SELECT name FROM users ORDER BY id DESC", &descriptor, None)
        .unwrap()
        .unwrap();
    assert_eq!(row.get("name"), Some(&SqlValue::Text("carol".into())));
}

#[test]
fn test_malformed_sql_reports_exactly_once() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor
        .execute_to_table("SELEC * FROM users", &descriptor)
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Execution);

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title.as_deref(), Some("execute_to_table"));
    assert_eq!(errors[0].module.as_deref(), Some("QueryExecutor"));
    assert!(errors[0].detail.as_deref().unwrap().contains("caused by"));

    sink.clear();
    let legacy = executor
        .execute_to_row("SELEC * FROM users", &descriptor, None)
        .or_sentinel();
    assert_eq!(legacy, None);
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_execute_to_table_missing_database_is_connection_failure() {
    let dir = TempDir::new().unwrap();
    let descriptor = ConnectionDescriptor::from(dir.path().join("gone.db").as_path());
    let (executor, sink) = executor();

    let err = executor
        .execute_to_table("SELECT 1", &descriptor)
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Connection);
    assert_eq!(sink.errors().len(), 1);
    assert!(sink.infos().is_empty());
}

#[test]
fn test_execute_generic_shapes() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let outcome = executor
        .execute_generic("SELECT name FROM users", &descriptor, true, None)
        .unwrap();
    assert_eq!(
        outcome.into_row().unwrap().get("name"),
        Some(&SqlValue::Text("alice".into()))
    );

    let outcome = executor
        .execute_generic("SELECT name FROM users", &descriptor, false, None)
        .unwrap();
    assert_eq!(outcome.into_table().unwrap().len(), 1);

    let outcome = executor
        .execute_generic("SELECT name FROM users WHERE id = 9", &descriptor, true, None)
        .unwrap();
    assert_eq!(outcome, ExecutionOutcome::Row(None));
    assert!(sink.is_empty());
}

#[test]
fn test_execute_generic_runs_statement_once() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    executor
        .execute_generic(
            "INSERT INTO users (name) VALUES ('dave')",
            &descriptor,
            false,
            None,
        )
        .unwrap();
    let count = executor
        .execute_to_row("SELECT COUNT(*) AS n FROM users WHERE name = 'dave'", &descriptor, None)
        .unwrap()
        .unwrap();
    assert_eq!(count.get("n"), Some(&SqlValue::Integer(1)));
}

#[test]
fn test_execute_generic_invalid_connection() {
    let dir = TempDir::new().unwrap();
    let descriptor = ConnectionDescriptor::from(dir.path().join("absent.db").as_path());
    let (executor, sink) = executor();

    let err = executor
        .execute_generic("SELECT 1", &descriptor, false, None)
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Connection);

    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title.as_deref(), Some("Connection validation failed"));
    assert_eq!(
        sink.infos()[0].message,
        "Failed to establish connection. Please validate the server connection and try again."
    );
}

#[test]
fn test_execute_dispatches_on_shape() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    let request = QueryRequest::text("UPDATE users SET name = 'alicia' WHERE id = 1")
        .shape(ResultShape::RowsAffected);
    assert_eq!(
        executor.execute(&request, &descriptor).unwrap(),
        ExecutionOutcome::RowsAffected(1)
    );

    let request = QueryRequest::text("SELECT name FROM users").shape(ResultShape::SingleRow);
    let row = executor.execute(&request, &descriptor).unwrap().into_row().unwrap();
    assert_eq!(row.get("name"), Some(&SqlValue::Text("alicia".into())));
}

#[test]
fn test_invalid_utf8_is_materialization_failure() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor
        .execute_to_table("SELECT CAST(x'c328' AS TEXT) AS garbled", &descriptor)
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Materialization);
    assert_eq!(sink.errors()[0].kind, Some(FailureKind::Materialization));
}

#[test]
fn test_timeout_expires_instead_of_hanging() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor
        .execute_to_row(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT MAX(x) FROM c",
            &descriptor,
            Some(Duration::from_millis(100)),
        )
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Execution);
    assert!(err.is_timeout());
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_mixed_parameter_styles_rejected_before_connecting() {
    let dir = TempDir::new().unwrap();
    let descriptor = ConnectionDescriptor::from(dir.path().join("never-opened.db").as_path());
    let (executor, sink) = executor();

    let request = QueryRequest::text("SELECT ?, @b")
        .bind(sqlgate::Parameter::positional(1))
        .bind(sqlgate::Parameter::named("b", 2));
    let err = executor.execute(&request, &descriptor).unwrap_err();
    assert_eq!(err.kind(), FailureKind::Execution);
    assert_eq!(
        err.message(),
        "cannot mix named and positional parameters in one statement"
    );
    assert_eq!(sink.len(), 1);
}
