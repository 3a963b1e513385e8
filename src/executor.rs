//! The query executor: one entry point per execution mode, all funnelling
//! into [`QueryExecutor::execute`].
//!
//! Every call opens its own connection, runs its statement exactly once,
//! materializes the result and drops the connection before returning. A
//! failure is reported to the diagnostics sink once and then handed back to
//! the caller as `Err`; callers that want the legacy `None` / `-1` shape use
//! [`Sentinel`](crate::request::Sentinel).

use crate::{
    config::ExecutorConfig,
    connection::{ConnectionDescriptor, Driver, DriverConnection},
    diagnostics::{DiagnosticsSink, ErrorContext},
    materialize::RowLimit,
    parameters::{self, Parameter},
    request::{ExecutionOutcome, QueryRequest, ResultShape},
    result::{QueryError, Result},
    str_utils::Identifier,
    table::{ResultRow, ResultTable},
    validator::ConnectionValidator,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Info notice sent when pre-validation rejects the descriptor
pub const CONNECTION_NOTICE: &str =
    "Failed to establish connection. Please validate the server connection and try again.";

pub struct QueryExecutor<D: Driver> {
    driver: D,
    config: ExecutorConfig,
    sink: Arc<dyn DiagnosticsSink>,
}

impl<D: Driver> QueryExecutor<D> {
    pub fn new(driver: D, sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self::with_config(driver, ExecutorConfig::default(), sink)
    }

    pub fn with_config(driver: D, config: ExecutorConfig, sink: Arc<dyn DiagnosticsSink>) -> Self {
        QueryExecutor {
            driver,
            config,
            sink,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn sink(&self) -> &dyn DiagnosticsSink {
        self.sink.as_ref()
    }

    fn context(&self, title: &str) -> ErrorContext {
        ErrorContext::new(title, &self.config.module, self.config.display_errors)
    }

    /// Pass `result` through, reporting a failure under `title`
    fn report<T>(&self, title: &str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.sink.report_error(err, &self.context(title));
        }
        result
    }

    /// Validator sharing this executor's driver, sink and reporting settings
    pub fn validator(&self) -> ConnectionValidator<'_, D> {
        ConnectionValidator::new(&self.driver, self.sink.as_ref())
            .with_context(&self.config.module, self.config.display_errors)
            .with_timeout(self.config.default_timeout())
    }

    /// Whether `descriptor` opens and answers a probe; a failure is reported once
    pub fn validate(&self, descriptor: &ConnectionDescriptor) -> bool {
        self.validator().validate(descriptor)
    }

    /// Run `request` once in the path selected by its shape
    pub fn execute(
        &self,
        request: &QueryRequest,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ExecutionOutcome> {
        self.report("execute", self.run(request, descriptor))
    }

    /// Ad-hoc text query behind a connection pre-check
    ///
    /// When the descriptor fails validation an info notice is emitted and a
    /// connection failure returned without executing anything; the validator
    /// has already reported the cause.
    pub fn execute_generic(
        &self,
        query: &str,
        descriptor: &ConnectionDescriptor,
        return_single_row: bool,
        timeout: Option<Duration>,
    ) -> Result<ExecutionOutcome> {
        let shape = if return_single_row {
            ResultShape::SingleRow
        } else {
            ResultShape::Table
        };
        let mut request = QueryRequest::text(query).shape(shape);
        request.timeout = timeout;
        self.validated("execute_generic", &request, descriptor)
    }

    /// Full result set of a text query
    pub fn execute_to_table(
        &self,
        query: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ResultTable> {
        let request = QueryRequest::text(query);
        self.report(
            "execute_to_table",
            self.fetch(&request, descriptor, RowLimit::All),
        )
    }

    /// First row of a text query, `None` when it returns no rows
    pub fn execute_to_row(
        &self,
        query: &str,
        descriptor: &ConnectionDescriptor,
        timeout: Option<Duration>,
    ) -> Result<Option<ResultRow>> {
        let mut request = QueryRequest::text(query).shape(ResultShape::SingleRow);
        request.timeout = timeout;
        self.report(
            "execute_to_row",
            self.fetch(&request, descriptor, RowLimit::First)
                .map(ResultTable::into_first),
        )
    }

    pub fn execute_stored_procedure(
        &self,
        name: &str,
        parameters: &[Parameter],
        descriptor: &ConnectionDescriptor,
    ) -> Result<ResultTable> {
        let result = Identifier::parse(name).and_then(|_| {
            let request = QueryRequest::procedure(name).with_parameters(parameters.to_vec());
            self.fetch(&request, descriptor, RowLimit::All)
        });
        self.report("execute_stored_procedure", result)
    }

    /// Non-query execution; `Ok(0)` is a success that touched no rows
    pub fn execute_batch(
        &self,
        query: &str,
        parameters: &[Parameter],
        descriptor: &ConnectionDescriptor,
    ) -> Result<u64> {
        let request = QueryRequest::text(query)
            .with_parameters(parameters.to_vec())
            .shape(ResultShape::RowsAffected);
        self.report("execute_batch", self.count(&request, descriptor))
    }

    /// Raise the identity of `table` to its current maximum; it is never lowered
    ///
    /// `table` must be a plain or schema-qualified identifier; anything else
    /// is rejected before SQL is built.
    pub fn reset_identity(
        &self,
        table: &str,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ExecutionOutcome> {
        let request = match self.identity_reset_request(table) {
            Ok(request) => request,
            Err(err) => return self.report("reset_identity", Err(err)),
        };
        self.validated("reset_identity", &request, descriptor)
    }

    fn identity_reset_request(&self, table: &str) -> Result<QueryRequest> {
        let table = Identifier::parse(table)?;
        let column = Identifier::parse(&self.config.identity_column)?;
        Ok(self.driver.identity_reset_request(&table, &column))
    }

    fn validated(
        &self,
        title: &str,
        request: &QueryRequest,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ExecutionOutcome> {
        let validator = self
            .validator()
            .with_timeout(self.config.resolve_timeout(request.timeout));
        if !validator.validate(descriptor) {
            self.sink
                .report_info(CONNECTION_NOTICE, self.config.display_errors);
            return Err(QueryError::connection("connection validation failed"));
        }
        self.report(title, self.run(request, descriptor))
    }

    fn run(
        &self,
        request: &QueryRequest,
        descriptor: &ConnectionDescriptor,
    ) -> Result<ExecutionOutcome> {
        match request.shape {
            ResultShape::SingleRow => self
                .fetch(request, descriptor, RowLimit::First)
                .map(|table| ExecutionOutcome::Row(table.into_first())),
            ResultShape::Table => self
                .fetch(request, descriptor, RowLimit::All)
                .map(ExecutionOutcome::Table),
            ResultShape::RowsAffected => self
                .count(request, descriptor)
                .map(ExecutionOutcome::RowsAffected),
        }
    }

    fn open(
        &self,
        request: &QueryRequest,
        descriptor: &ConnectionDescriptor,
    ) -> Result<D::Connection> {
        parameters::check_parameters(&request.parameters)?;
        let timeout = self.config.resolve_timeout(request.timeout);
        tracing::debug!(
            driver = self.driver.name(),
            command = %request.command,
            shape = ?request.shape,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "opening connection"
        );
        self.driver.connect(descriptor, timeout)
    }

    fn fetch(
        &self,
        request: &QueryRequest,
        descriptor: &ConnectionDescriptor,
        limit: RowLimit,
    ) -> Result<ResultTable> {
        let started = Instant::now();
        let mut conn = self.open(request, descriptor)?;
        let table = conn.fetch(&request.command, &request.parameters, limit)?;
        tracing::debug!(
            rows = table.len(),
            columns = table.schema().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query materialized"
        );
        Ok(table)
    }

    fn count(&self, request: &QueryRequest, descriptor: &ConnectionDescriptor) -> Result<u64> {
        let started = Instant::now();
        let mut conn = self.open(request, descriptor)?;
        let affected = conn.execute(&request.command, &request.parameters)?;
        tracing::debug!(
            affected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "statement executed"
        );
        Ok(affected)
    }
}
