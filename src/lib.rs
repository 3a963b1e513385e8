pub mod config;
pub mod connection;
pub mod diagnostics;
#[cfg(feature = "postgresql")]
pub mod driver_postgresql;
#[cfg(feature = "sqlite")]
pub mod driver_sqlite;
pub mod executor;
pub mod materialize;
pub mod parameters;
pub mod procedures;
pub mod request;
pub mod result;
pub mod str_utils;
pub mod table;
pub mod validator;
pub mod value;

// Re-export types for convenience
pub use config::{ExecutorConfig, SqliteSettings};
pub use connection::{ConnectionDescriptor, Driver, DriverConnection};
pub use diagnostics::{
    DiagnosticRecord, DiagnosticsSink, ErrorContext, MemorySink, Notifier, NullSink, TracingSink,
};
#[cfg(feature = "postgresql")]
pub use driver_postgresql::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use driver_sqlite::SqliteDriver;
pub use executor::QueryExecutor;
pub use parameters::{Parameter, ParameterType};
pub use procedures::{ProcedureCatalog, ProcedureDef};
pub use request::{Command, ExecutionOutcome, QueryRequest, ResultShape, Sentinel};
pub use result::{FailureKind, QueryError, Result};
pub use table::{Column, ResultRow, ResultTable, Schema};
pub use validator::ConnectionValidator;
pub use value::{ColumnType, SqlValue};

// Re-export third-party types used in the public API to provide fallback for dependency conflicts
pub use serde_json::Value as JsonValue;
