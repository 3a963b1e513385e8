use crate::{
    parameters::Parameter,
    result::Result,
    table::{ResultRow, ResultTable},
};
use std::fmt;
use std::time::Duration;

/// What the driver is asked to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ad-hoc SQL text
    Text(String),
    /// Name of a stored procedure (PostgreSQL function, or a catalog entry for SQLite)
    StoredProcedure(String),
}

impl Command {
    pub fn text(&self) -> &str {
        match self {
            Command::Text(sql) => sql,
            Command::StoredProcedure(name) => name,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Text(sql) => write!(f, "{sql}"),
            Command::StoredProcedure(name) => write!(f, "procedure {name}"),
        }
    }
}

/// Which materialization path a request takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    SingleRow,
    Table,
    RowsAffected,
}

/// A single statement execution request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub command: Command,
    pub parameters: Vec<Parameter>,
    /// `None` uses the executor default, `Some(Duration::ZERO)` means unbounded
    pub timeout: Option<Duration>,
    pub shape: ResultShape,
}

impl QueryRequest {
    /// SQL text returning a full table
    pub fn text(sql: impl Into<String>) -> Self {
        QueryRequest {
            command: Command::Text(sql.into()),
            parameters: Vec::new(),
            timeout: None,
            shape: ResultShape::Table,
        }
    }

    /// Stored procedure call returning a full table
    pub fn procedure(name: impl Into<String>) -> Self {
        QueryRequest {
            command: Command::StoredProcedure(name.into()),
            parameters: Vec::new(),
            timeout: None,
            shape: ResultShape::Table,
        }
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn bind(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }
}

/// Successful result of an execution, one variant per shape
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// First row, `None` when the statement returned no rows
    Row(Option<ResultRow>),
    Table(ResultTable),
    RowsAffected(u64),
}

impl ExecutionOutcome {
    pub fn into_row(self) -> Option<ResultRow> {
        match self {
            ExecutionOutcome::Row(row) => row,
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<ResultTable> {
        match self {
            ExecutionOutcome::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            ExecutionOutcome::RowsAffected(n) => Some(*n),
            _ => None,
        }
    }
}

/// Collapse a `Result` into the legacy sentinel shape: `None` or `-1` on failure
///
/// The failure itself has already been reported to the diagnostics sink by the
/// executor; only the sentinel survives the conversion.
pub trait Sentinel {
    type Legacy;

    fn or_sentinel(self) -> Self::Legacy;
}

impl Sentinel for Result<u64> {
    type Legacy = i64;

    fn or_sentinel(self) -> i64 {
        self.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl Sentinel for Result<ResultTable> {
    type Legacy = Option<ResultTable>;

    fn or_sentinel(self) -> Option<ResultTable> {
        self.ok()
    }
}

impl Sentinel for Result<Option<ResultRow>> {
    type Legacy = Option<ResultRow>;

    fn or_sentinel(self) -> Option<ResultRow> {
        self.ok().flatten()
    }
}

impl Sentinel for Result<ExecutionOutcome> {
    type Legacy = Option<ExecutionOutcome>;

    /// An empty single-row outcome also collapses to `None`
    fn or_sentinel(self) -> Option<ExecutionOutcome> {
        match self {
            Ok(ExecutionOutcome::Row(None)) | Err(_) => None,
            Ok(outcome) => Some(outcome),
        }
    }
}
