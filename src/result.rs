use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Boxed driver-level cause attached to a `QueryError`
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Category of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unreachable server, bad credentials, missing database file, connect timeout
    Connection,
    /// Malformed statement, constraint violation, parameter errors, statement timeout
    Execution,
    /// Cursor or value conversion errors while building rows
    Materialization,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Connection => "connection",
            FailureKind::Execution => "execution",
            FailureKind::Materialization => "materialization",
        };
        write!(f, "{s}")
    }
}

/// Raised when a connect or a statement runs past its time budget
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation exceeded its timeout of {}ms", .0.as_millis())]
pub struct TimeoutElapsed(pub Duration);

/// Main error type for sqlgate operations
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Connection failure: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("Execution failure: {message}")]
    Execution {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("Materialization failure: {message}")]
    Materialization {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl QueryError {
    pub fn connection(message: impl Into<String>) -> Self {
        QueryError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_caused<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        QueryError::Execution {
            message: message.into(),
            source: None,
        }
    }

    pub fn execution_caused<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::Execution {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn materialization(message: impl Into<String>) -> Self {
        QueryError::Materialization {
            message: message.into(),
            source: None,
        }
    }

    pub fn materialization_caused<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QueryError::Materialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn parameter_not_provided(name: impl fmt::Display) -> Self {
        Self::execution(format!("parameter not provided: {name}"))
    }

    pub fn parameter_type_mismatch(expected: impl fmt::Display, got: impl fmt::Display) -> Self {
        Self::execution(format!(
            "parameter type mismatch: expected {expected}, got {got}"
        ))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            QueryError::Connection { .. } => FailureKind::Connection,
            QueryError::Execution { .. } => FailureKind::Execution,
            QueryError::Materialization { .. } => FailureKind::Materialization,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            QueryError::Connection { message, .. }
            | QueryError::Execution { message, .. }
            | QueryError::Materialization { message, .. } => message,
        }
    }

    /// True when the failure (or one of its causes) is an elapsed timeout
    pub fn is_timeout(&self) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> =
            std::error::Error::source(self);
        while let Some(err) = current {
            if err.is::<TimeoutElapsed>() {
                return true;
            }
            current = err.source();
        }
        false
    }

    /// Full cause chain, one cause per line, used as the "stack" of a diagnostic record
    pub fn detail(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            lines.push(format!("caused by: {err}"));
            current = err.source();
        }
        lines.join("\n")
    }
}

/// Type alias for Results using QueryError
pub type Result<T> = std::result::Result<T, QueryError>;
