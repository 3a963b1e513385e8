#![cfg(feature = "sqlite")]

use pretty_assertions::assert_eq;
use serde_json::json;
use sqlgate::{
    ConnectionDescriptor, ExecutionOutcome, FailureKind, MemorySink, Parameter, ProcedureCatalog,
    QueryExecutor, QueryRequest, ResultShape, SqlValue, SqliteDriver,
};
use std::sync::Arc;
use tempfile::TempDir;

fn setup_db() -> (TempDir, ConnectionDescriptor) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("procs.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
         CREATE TABLE audit (note TEXT NOT NULL);
         INSERT INTO users (name) VALUES ('alice'), ('albert'), ('bob');",
    )
    .unwrap();
    (dir, ConnectionDescriptor::from(path.as_path()))
}

fn executor() -> (QueryExecutor<SqliteDriver>, Arc<MemorySink>) {
    let catalog = ProcedureCatalog::from_file("test_json/procedures.json").unwrap();
    let sink = Arc::new(MemorySink::new());
    let driver = SqliteDriver::new().with_procedures(catalog);
    (QueryExecutor::new(driver, sink.clone()), sink)
}

#[test]
fn test_catalog_loads_fixture() {
    let catalog = ProcedureCatalog::from_file("test_json/procedures.json").unwrap();
    assert_eq!(catalog.len(), 4);
    let def = catalog.get("rename_user").unwrap();
    let names: Vec<&str> = def.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["name", "id"]);
}

#[test]
fn test_procedure_with_positional_parameter() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let table = executor
        .execute_stored_procedure("user_by_id", &[Parameter::positional(2)], &descriptor)
        .unwrap();
    assert_eq!(table.to_json(), json!([{"id": 2, "name": "albert"}]));
    assert!(sink.is_empty());
}

#[test]
fn test_procedure_with_named_parameter() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    let table = executor
        .execute_stored_procedure(
            "users_named_like",
            &[Parameter::named("pattern", "al%")],
            &descriptor,
        )
        .unwrap();
    let names: Vec<&SqlValue> = table.rows().iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(
        names,
        vec![
            &SqlValue::Text("alice".into()),
            &SqlValue::Text("albert".into())
        ]
    );
}

#[test]
fn test_procedure_without_parameters_returns_full_table() {
    let (_dir, descriptor) = setup_db();
    let (executor, _sink) = executor();

    let table = executor
        .execute_stored_procedure("all_users", &[], &descriptor)
        .unwrap();
    assert_eq!(table.len(), 3);
}

#[test]
fn test_procedure_parameter_type_enforced() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor
        .execute_stored_procedure("user_by_id", &[Parameter::positional("two")], &descriptor)
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Execution);
    assert_eq!(
        err.message(),
        "parameter type mismatch: expected integer for @id, got text"
    );
    assert_eq!(sink.errors().len(), 1);
    assert_eq!(
        sink.errors()[0].title.as_deref(),
        Some("execute_stored_procedure")
    );
}

#[test]
fn test_unknown_procedure_is_execution_failure() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor
        .execute_stored_procedure("drop_everything", &[], &descriptor)
        .unwrap_err();
    assert_eq!(err.message(), "procedure not found: drop_everything");
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_procedure_name_must_be_identifier() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let err = executor
        .execute_stored_procedure("all_users; DROP TABLE users", &[], &descriptor)
        .unwrap_err();
    assert!(err.message().starts_with("invalid identifier"));
    assert_eq!(sink.len(), 1);
}

#[test]
fn test_multi_statement_procedure_as_non_query() {
    let (_dir, descriptor) = setup_db();
    let (executor, sink) = executor();

    let request = QueryRequest::procedure("rename_user")
        .bind(Parameter::named("id", 3))
        .bind(Parameter::named("name", "robert"))
        .shape(ResultShape::RowsAffected);
    assert_eq!(
        executor.execute(&request, &descriptor).unwrap(),
        ExecutionOutcome::RowsAffected(2)
    );

    let audit = executor
        .execute_to_row("SELECT note FROM audit", &descriptor, None)
        .unwrap()
        .unwrap();
    assert_eq!(audit.get("note"), Some(&SqlValue::Text("renamed robert".into())));
    assert!(sink.is_empty());
}
