use crate::{
    config::DEFAULT_TIMEOUT_MS,
    connection::{ConnectionDescriptor, Driver, DriverConnection},
    diagnostics::{DiagnosticsSink, ErrorContext},
    result::{QueryError, Result},
};
use std::time::Duration;

/// Title of the error event emitted when validation fails
pub const VALIDATION_FAILED_TITLE: &str = "Connection validation failed";

/// Opens, probes and releases a connection to decide whether a descriptor is usable
pub struct ConnectionValidator<'a, D: Driver> {
    driver: &'a D,
    sink: &'a dyn DiagnosticsSink,
    context: ErrorContext,
    timeout: Option<Duration>,
}

impl<'a, D: Driver> ConnectionValidator<'a, D> {
    pub fn new(driver: &'a D, sink: &'a dyn DiagnosticsSink) -> Self {
        ConnectionValidator {
            driver,
            sink,
            context: ErrorContext::new(VALIDATION_FAILED_TITLE, "ConnectionValidator", true),
            timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
        }
    }

    /// Module name and display flag stamped on the failure event
    pub fn with_context(mut self, module: impl Into<String>, display_to_user: bool) -> Self {
        self.context = ErrorContext::new(VALIDATION_FAILED_TITLE, module, display_to_user);
        self
    }

    /// Bound on connect plus probe; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Like [`validate`](Self::validate) but returns the cause and reports nothing
    pub fn check(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        let mut conn = self.driver.connect(descriptor, self.timeout)?;
        conn.probe()?;
        if !conn.is_open() {
            return Err(QueryError::connection(
                "connection reported closed after a successful probe",
            ));
        }
        Ok(())
    }

    /// `true` when the descriptor opens and answers a probe. A failure is
    /// reported to the sink once and yields `false`.
    pub fn validate(&self, descriptor: &ConnectionDescriptor) -> bool {
        match self.check(descriptor) {
            Ok(()) => {
                tracing::debug!(driver = self.driver.name(), "connection validated");
                true
            }
            Err(err) => {
                self.sink.report_error(&err, &self.context);
                false
            }
        }
    }
}
