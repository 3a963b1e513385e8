use crate::{
    materialize::RowLimit,
    parameters::Parameter,
    request::{Command, QueryRequest},
    result::Result,
    str_utils::Identifier,
    table::ResultTable,
};
use std::fmt;
use std::time::Duration;

/// Opaque connection string handed verbatim to the driver
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionDescriptor(String);

impl ConnectionDescriptor {
    pub fn new(raw: impl Into<String>) -> Self {
        ConnectionDescriptor(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionDescriptor {
    fn from(raw: &str) -> Self {
        ConnectionDescriptor::new(raw)
    }
}

impl From<String> for ConnectionDescriptor {
    fn from(raw: String) -> Self {
        ConnectionDescriptor(raw)
    }
}

impl From<&std::path::Path> for ConnectionDescriptor {
    fn from(path: &std::path::Path) -> Self {
        ConnectionDescriptor(path.to_string_lossy().into_owned())
    }
}

// Descriptors routinely carry passwords, so only the length is shown
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionDescriptor(<{} chars>)", self.0.len())
    }
}

/// A database backend able to open short-lived connections
pub trait Driver: Send + Sync {
    type Connection: DriverConnection;

    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Open a connection; `timeout` bounds the connect and every statement run on it
    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Option<Duration>,
    ) -> Result<Self::Connection>;

    /// Parameterized statement that raises the identity of `table` to its current maximum, never lowering it
    fn identity_reset_request(
        &self,
        table: &Identifier,
        identity_column: &Identifier,
    ) -> QueryRequest;
}

/// One open connection. Dropping it releases every underlying handle.
pub trait DriverConnection {
    /// Whether the handle still reports an open state
    fn is_open(&self) -> bool;

    /// Round-trip a trivial statement to confirm the server is usable
    fn probe(&mut self) -> Result<()>;

    /// Run `command` once and materialize its rows
    fn fetch(
        &mut self,
        command: &Command,
        parameters: &[Parameter],
        limit: RowLimit,
    ) -> Result<ResultTable>;

    /// Run `command` as a non-query and return the number of affected rows
    fn execute(&mut self, command: &Command, parameters: &[Parameter]) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_descriptor_contents() {
        let descriptor = ConnectionDescriptor::from("host=db user=app password=hunter2");
        let rendered = format!("{descriptor:?}");
        assert!(!rendered.contains("hunter2"));
        assert_eq!(descriptor.as_str(), "host=db user=app password=hunter2");
    }
}
