#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgate::{
    ConnectionDescriptor, FailureKind, MemorySink, Parameter, ParameterType, QueryExecutor,
    Sentinel, SqlValue, SqliteDriver,
};
use std::sync::Arc;
use tempfile::TempDir;

fn setup_db() -> (TempDir, ConnectionDescriptor) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("batch.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, avatar BLOB);
         CREATE TABLE audit (note TEXT NOT NULL);
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
fn test_update_reports_affected_rows() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let updated = executor
        .execute_batch(
            "UPDATE users SET name = 'x' WHERE id = ?",
            &[Parameter::positional(1)],
            &descriptor,
        )
        .unwrap();
    assert_eq!(updated, 1);

    let untouched = executor
        .execute_batch(
            "UPDATE users SET name = 'x' WHERE id = ?",
            &[Parameter::positional(999)],
            &descriptor,
        )
        .unwrap();
    assert_eq!(untouched, 0);
    assert!(sink.is_empty());
}

#[test]
fn test_trailing_comment_keeps_single_statement() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let updated = executor
        .execute_batch(
            "UPDATE users SET name = 'x' WHERE id = ?; -- rename the first user",
            &[Parameter::positional(1)],
            &descriptor,
        )
        .unwrap();
    assert_eq!(updated, 1);

    let updated = executor
        .execute_batch(
            "/* leading; note */ UPDATE users SET name = 'y' WHERE id = ?; /* trailing */",
            &[Parameter::positional(1)],
            &descriptor,
        )
        .unwrap();
    assert_eq!(updated, 1);
    assert!(sink.is_empty());
}

#[test]
fn test_failed_batch_yields_sentinel() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let legacy = executor
        .execute_batch("UPDATE missing SET a = 1", &[], &descriptor)
        .or_sentinel();
    assert_eq!(legacy, -1);
    assert_eq!(sink.errors().len(), 1);
    assert_eq!(sink.errors()[0].title.as_deref(), Some("execute_batch"));
}

#[test]
fn test_named_parameters_with_values_of_every_type() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    let inserted = executor
        .execute_batch(
            "INSERT INTO users (name, avatar) VALUES (@name, @avatar)",
            &[
                Parameter::named("name", "bob").with_type(ParameterType::Text),
                Parameter::named("avatar", vec![0u8, 159, 146, 150]),
            ],
            &descriptor,
        )
        .unwrap();
    assert_eq!(inserted, 1);

    let row = executor
        .execute_to_row("SELECT avatar FROM users WHERE name = 'bob'", &descriptor, None)
        .unwrap()
        .unwrap();
    assert_eq!(row.get("avatar"), Some(&SqlValue::Blob(vec![0, 159, 146, 150])));
}

#[test]
fn test_null_parameter_binds_null() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    executor
        .execute_batch(
            "UPDATE users SET avatar = :avatar WHERE id = :id",
            &[
                Parameter::named("avatar", None::<Vec<u8>>),
                Parameter::named("id", 1),
            ],
            &descriptor,
        )
        .unwrap();
    let row = executor
        .execute_to_row("SELECT avatar IS NULL AS cleared FROM users WHERE id = 1", &descriptor, None)
        .unwrap()
        .unwrap();
    assert_eq!(row.get("cleared"), Some(&SqlValue::Integer(1)));
}

#[test]
fn test_declared_type_mismatch_rejected() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor
        .execute_batch(
            "DELETE FROM users WHERE id = @id",
            &[Parameter::named("id", "one").with_type(ParameterType::Integer)],
            &descriptor,
        )
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Execution);
    assert!(err.message().starts_with("parameter type mismatch"));
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_multi_statement_batch_sums_rows() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    let affected = executor
        .execute_batch(
            "INSERT INTO users (name) VALUES (@first), (@second);
             UPDATE users SET name = upper(name) WHERE name = @first;
             INSERT INTO audit (note) VALUES ('added; ' || @second)",
            &[
                Parameter::named("first", "erin"),
                Parameter::named("second", "frank"),
            ],
            &descriptor,
        )
        .unwrap();
    assert_eq!(affected, 4);

    let table = executor
        .execute_to_table("SELECT name FROM users ORDER BY id", &descriptor)
        .unwrap();
    assert_eq!(
        table.to_json(),
        json!([{"name": "alice"}, {"name": "ERIN"}, {"name": "frank"}])
    );
    let audit = executor
        .execute_to_row("SELECT note FROM audit", &descriptor, None)
        .unwrap()
        .unwrap();
    assert_eq!(audit.get("note"), Some(&SqlValue::Text("added; frank".into())));
}

#[test]
fn test_multi_statement_batch_rolls_back_on_failure() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor
        .execute_batch(
            "INSERT INTO users (name) VALUES ('ghost'); INSERT INTO users (name) VALUES (NULL)",
            &[],
            &descriptor,
        )
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Execution);
    assert_eq!(sink.len(), 1);

    let ghosts = executor
        .execute_to_row("SELECT COUNT(*) AS n FROM users WHERE name = 'ghost'", &descriptor, None)
        .unwrap()
        .unwrap();
    assert_eq!(ghosts.get("n"), Some(&SqlValue::Integer(0)));
}

#[test]
fn test_multi_statement_batch_rejects_positional_parameters() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    let err = executor
        .execute_batch(
            "DELETE FROM audit; DELETE FROM users WHERE id = ?",
            &[Parameter::positional(1)],
            &descriptor,
        )
        .unwrap_err();
    assert!(err.message().contains("positional parameters"));
}

#[test]
fn test_multi_statement_batch_rejects_unused_parameter() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    let err = executor
        .execute_batch(
            "DELETE FROM audit; DELETE FROM users WHERE id = @id",
            &[Parameter::named("id", 1), Parameter::named("stray", 2)],
            &descriptor,
        )
        .unwrap_err();
    assert_eq!(err.message(), "parameter @stray is not used by the statement");

    let still_there = executor
        .execute_to_table("SELECT id FROM users", &descriptor)
        .unwrap();
    assert_eq!(still_there.len(), 1);
}
