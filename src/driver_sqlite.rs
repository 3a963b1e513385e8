use crate::{
    config::SqliteSettings,
    connection::{ConnectionDescriptor, Driver, DriverConnection},
    materialize::{Cursor, RowLimit, materialize},
    parameters::{self, BindingStyle, Parameter},
    procedures::ProcedureCatalog,
    request::{Command, QueryRequest},
    result::{QueryError, Result, TimeoutElapsed},
    str_utils::{Identifier, split_sql_statements},
    table::{Column, ResultTable},
    value::{ColumnType, SqlValue},
};
use rusqlite::{
    Connection, OpenFlags, Statement,
    fallible_iterator::FallibleIterator,
    ffi::ErrorCode,
    types::{ToSqlOutput, Value, ValueRef},
};
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

// SQLite VM instructions between two deadline checks
const PROGRESS_CHECK_INTERVAL: i32 = 1_000;

impl rusqlite::ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(r) => ToSqlOutput::Owned(Value::Real(*r)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
            // SQLite represents booleans as integers
            SqlValue::Boolean(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Json(v) => ToSqlOutput::Owned(Value::Text(v.to_string())),
        })
    }
}

/// Map a rusqlite error raised while running a statement, recognising deadline interrupts
fn statement_error(context: &str, err: rusqlite::Error, timeout: Option<Duration>) -> QueryError {
    match timeout {
        Some(timeout) if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) => {
            QueryError::execution_caused(
                format!("{context}: statement interrupted"),
                TimeoutElapsed(timeout),
            )
        }
        _ => QueryError::execution_caused(context, err),
    }
}

/// SQLite backend. Each connection opens the descriptor as a file path or `file:` URI.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    settings: SqliteSettings,
    procedures: Arc<ProcedureCatalog>,
}

impl SqliteDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &SqliteSettings) -> Self {
        SqliteDriver {
            settings: settings.clone(),
            procedures: Arc::default(),
        }
    }

    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.settings.create_if_missing = create;
        self
    }

    /// Catalog that `Command::StoredProcedure` names are resolved against
    pub fn with_procedures(mut self, catalog: ProcedureCatalog) -> Self {
        self.procedures = Arc::new(catalog);
        self
    }

    pub fn procedures(&self) -> &ProcedureCatalog {
        &self.procedures
    }
}

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Option<Duration>,
    ) -> Result<SqliteConnection> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.settings.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = Connection::open_with_flags(descriptor.as_str(), flags)
            .map_err(|e| QueryError::connection_caused("cannot open SQLite database", e))?;

        let busy_timeout = Duration::from_millis(self.settings.busy_timeout_ms);
        let busy_timeout = timeout.map_or(busy_timeout, |t| t.min(busy_timeout));
        conn.busy_timeout(busy_timeout)
            .map_err(|e| QueryError::connection_caused("cannot configure busy timeout", e))?;

        if let Some(timeout) = timeout {
            let deadline = Instant::now() + timeout;
            conn.progress_handler(
                PROGRESS_CHECK_INTERVAL,
                Some(move || Instant::now() >= deadline),
            );
        }

        Ok(SqliteConnection {
            conn,
            procedures: Arc::clone(&self.procedures),
            timeout,
        })
    }

    fn identity_reset_request(
        &self,
        table: &Identifier,
        _identity_column: &Identifier,
    ) -> QueryRequest {
        let sequence_table = match &table.schema {
            Some(schema) => format!("\"{schema}\".sqlite_sequence"),
            None => "sqlite_sequence".to_string(),
        };
        // Like CHECKIDENT: raise the sequence to the column maximum, never lower it
        let sql = format!(
            "UPDATE {sequence_table} SET seq = MAX(seq, (SELECT COALESCE(MAX(rowid), 0) FROM {})) WHERE name = @table_name",
            table.quoted()
        );
        QueryRequest::text(sql).bind(Parameter::named("table_name", table.name.as_str()))
    }
}

/// An open SQLite handle, closed when dropped
pub struct SqliteConnection {
    conn: Connection,
    procedures: Arc<ProcedureCatalog>,
    timeout: Option<Duration>,
}

impl SqliteConnection {
    /// SQL text and parameters to run for `command`
    fn resolve<'a>(
        &'a self,
        command: &'a Command,
        params: &'a [Parameter],
    ) -> Result<(&'a str, Cow<'a, [Parameter]>)> {
        match command {
            Command::Text(sql) => Ok((sql.as_str(), Cow::Borrowed(params))),
            Command::StoredProcedure(name) => {
                let def = self.procedures.get(name)?;
                Ok((def.sql.as_str(), Cow::Owned(def.bind(params)?)))
            }
        }
    }

    fn prepare<'c>(&'c self, sql: &str) -> Result<Statement<'c>> {
        self.conn
            .prepare(sql)
            .map_err(|e| statement_error("failed to prepare statement", e, self.timeout))
    }

    fn execute_many(&mut self, sql: &str, params: &[Parameter]) -> Result<u64> {
        if parameters::check_parameters(params)? == BindingStyle::Positional {
            return Err(QueryError::execution(
                "positional parameters are ambiguous in a multi-statement batch; use named parameters",
            ));
        }

        let timeout = self.timeout;
        let tx = self
            .conn
            .transaction()
            .map_err(|e| statement_error("failed to begin batch transaction", e, timeout))?;

        let mut total = 0;
        let mut used = HashSet::new();
        {
            let mut batch = rusqlite::Batch::new(&tx, sql);
            while let Some(mut stmt) = batch
                .next()
                .map_err(|e| statement_error("failed to prepare batch statement", e, timeout))?
            {
                bind_named(&mut stmt, params, &mut used)?;
                let changed = stmt
                    .raw_execute()
                    .map_err(|e| statement_error("batch statement failed", e, timeout))?;
                total += changed as u64;
            }
        }
        ensure_all_used(params, &used)?;

        tx.commit()
            .map_err(|e| statement_error("failed to commit batch transaction", e, timeout))?;
        Ok(total)
    }
}

impl DriverConnection for SqliteConnection {
    // A rusqlite handle is open for as long as it exists
    fn is_open(&self) -> bool {
        true
    }

    // Reading the schema makes SQLite parse the file header
    fn probe(&mut self) -> Result<()> {
        self.conn
            .query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| QueryError::connection_caused("SQLite database is not usable", e))
    }

    fn fetch(
        &mut self,
        command: &Command,
        params: &[Parameter],
        limit: RowLimit,
    ) -> Result<ResultTable> {
        let (sql, params) = self.resolve(command, params)?;
        let mut stmt = self.prepare(sql)?;
        bind_parameters(&mut stmt, &params)?;

        let columns = sqlite_columns(&stmt);
        let mut cursor = SqliteCursor {
            columns,
            rows: stmt.raw_query(),
            timeout: self.timeout,
        };
        materialize(&mut cursor, limit)
    }

    fn execute(&mut self, command: &Command, params: &[Parameter]) -> Result<u64> {
        let (sql, params) = self.resolve(command, params)?;
        if split_sql_statements(sql).len() > 1 {
            let (sql, params) = (sql.to_string(), params.into_owned());
            return self.execute_many(&sql, &params);
        }

        let mut stmt = self.prepare(sql)?;
        bind_parameters(&mut stmt, &params)?;
        let changed = stmt
            .raw_execute()
            .map_err(|e| statement_error("statement failed", e, self.timeout))?;
        Ok(changed as u64)
    }
}

/// Bind `params` to a single prepared statement, requiring every placeholder to be bound
fn bind_parameters(stmt: &mut Statement<'_>, params: &[Parameter]) -> Result<()> {
    match parameters::check_parameters(params)? {
        BindingStyle::Positional => {
            let expected = stmt.parameter_count();
            if params.len() != expected {
                return Err(QueryError::execution(format!(
                    "statement expects {expected} parameters, got {}",
                    params.len()
                )));
            }
            for (idx, param) in params.iter().enumerate() {
                stmt.raw_bind_parameter(idx + 1, &param.value)
                    .map_err(|e| {
                        QueryError::execution_caused(
                            format!("failed to bind parameter {}", param.label(idx)),
                            e,
                        )
                    })?;
            }
            Ok(())
        }
        BindingStyle::Named | BindingStyle::None => {
            let mut used = HashSet::new();
            bind_named(stmt, params, &mut used)?;
            ensure_all_used(params, &used)
        }
    }
}

/// Bind every placeholder of `stmt` by name, recording which parameters were used
fn bind_named(
    stmt: &mut Statement<'_>,
    params: &[Parameter],
    used: &mut HashSet<usize>,
) -> Result<()> {
    for idx in 1..=stmt.parameter_count() {
        let placeholder = stmt
            .parameter_name(idx)
            .map(str::to_string)
            .ok_or_else(|| {
                if params.is_empty() {
                    QueryError::parameter_not_provided(format!("#{idx}"))
                } else {
                    QueryError::execution(
                        "statement uses positional placeholders but parameters are named",
                    )
                }
            })?;
        // SQLite reports the name with its prefix character (:name, @name, $name)
        let bare = placeholder.get(1..).unwrap_or_default();
        let (position, param) = params
            .iter()
            .enumerate()
            .find(|(_, p)| p.name.as_deref() == Some(bare))
            .ok_or_else(|| QueryError::parameter_not_provided(&placeholder))?;

        stmt.raw_bind_parameter(idx, &param.value).map_err(|e| {
            QueryError::execution_caused(
                format!("failed to bind parameter {}", param.label(position)),
                e,
            )
        })?;
        used.insert(position);
    }
    Ok(())
}

fn ensure_all_used(params: &[Parameter], used: &HashSet<usize>) -> Result<()> {
    match params
        .iter()
        .enumerate()
        .find(|(position, _)| !used.contains(position))
    {
        Some((position, unused)) => Err(QueryError::execution(format!(
            "parameter {} is not used by the statement",
            unused.label(position)
        ))),
        None => Ok(()),
    }
}

fn sqlite_columns(stmt: &Statement<'_>) -> Vec<Column> {
    stmt.columns()
        .into_iter()
        .map(|column| {
            let declared = column.decl_type().map(str::to_string);
            let column_type = declared
                .as_deref()
                .map_or(ColumnType::Unknown, ColumnType::from_sqlite_decl);
            Column::new(column.name(), declared, column_type)
        })
        .collect()
}

fn value_from_sqlite(column: &Column, value: ValueRef<'_>) -> Result<SqlValue> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) if column.column_type == ColumnType::Boolean && (i == 0 || i == 1) => {
            SqlValue::Boolean(i == 1)
        }
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(r) => SqlValue::Real(r),
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                QueryError::materialization_caused(
                    format!("column '{}' holds invalid UTF-8 text", column.name),
                    e,
                )
            })?;
            SqlValue::Text(text.to_string())
        }
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    })
}

struct SqliteCursor<'stmt> {
    columns: Vec<Column>,
    rows: rusqlite::Rows<'stmt>,
    timeout: Option<Duration>,
}

impl Cursor for SqliteCursor<'_> {
    fn columns(&self) -> Vec<Column> {
        self.columns.clone()
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        let row = match self.rows.next() {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(statement_error("failed to step result cursor", e, self.timeout)),
        };

        let mut values = Vec::with_capacity(self.columns.len());
        for (idx, column) in self.columns.iter().enumerate() {
            let raw = row.get_ref(idx).map_err(|e| {
                QueryError::materialization_caused(
                    format!("cannot read column '{}'", column.name),
                    e,
                )
            })?;
            values.push(value_from_sqlite(column, raw)?);
        }
        Ok(Some(values))
    }
}
