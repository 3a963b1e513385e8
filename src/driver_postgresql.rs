use crate::{
    connection::{ConnectionDescriptor, Driver, DriverConnection},
    materialize::{Cursor, RowLimit, materialize},
    parameters::{self, BindingStyle, Parameter},
    request::{Command, QueryRequest},
    result::{QueryError, Result, TimeoutElapsed},
    str_utils::{Identifier, split_sql_statements},
    table::{Column, ResultTable},
    value::{ColumnType, SqlValue},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::HashSet;
use std::error::Error;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio_postgres::{
    Client, NoTls, Row, Statement,
    types::{FromSql, ToSql, Type},
};

// PostgreSQL type OIDs for all supported column and parameter types
const POSTGRES_TYPE_OID_BOOL: u32 = 16;
const POSTGRES_TYPE_OID_BYTEA: u32 = 17;
const POSTGRES_TYPE_OID_NAME: u32 = 19;
const POSTGRES_TYPE_OID_INT2: u32 = 21;
const POSTGRES_TYPE_OID_INT4: u32 = 23;
const POSTGRES_TYPE_OID_INT8: u32 = 20;
const POSTGRES_TYPE_OID_FLOAT4: u32 = 700;
const POSTGRES_TYPE_OID_FLOAT8: u32 = 701;
const POSTGRES_TYPE_OID_UNKNOWN: u32 = 705;
const POSTGRES_TYPE_OID_TEXT: u32 = 25;
const POSTGRES_TYPE_OID_VARCHAR: u32 = 1043;
const POSTGRES_TYPE_OID_BPCHAR: u32 = 1042;
const POSTGRES_TYPE_OID_JSON: u32 = 114;
const POSTGRES_TYPE_OID_JSONB: u32 = 3802;
const POSTGRES_TYPE_OID_DATE: u32 = 1082;
const POSTGRES_TYPE_OID_TIME: u32 = 1083;
const POSTGRES_TYPE_OID_TIMESTAMP: u32 = 1114;
const POSTGRES_TYPE_OID_TIMESTAMPTZ: u32 = 1184;
const POSTGRES_TYPE_OID_NUMERIC: u32 = 1700;
const POSTGRES_TYPE_OID_UUID: u32 = 2950;

type PgParam = Box<dyn ToSql + Sync>;

fn dollar(idx: usize) -> String {
    format!("${idx}")
}

/// Point in time after which every pending round-trip is abandoned
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

impl Deadline {
    fn after(timeout: Option<Duration>) -> Option<Self> {
        timeout.map(|timeout| Deadline {
            at: Instant::now() + timeout,
            timeout,
        })
    }
}

/// Drive `fut` to completion on `runtime`, giving up once `deadline` passes
fn block_on<F: Future>(
    runtime: &Runtime,
    deadline: Option<Deadline>,
    fut: F,
) -> std::result::Result<F::Output, TimeoutElapsed> {
    match deadline {
        None => Ok(runtime.block_on(fut)),
        // The timer must be created inside the runtime, where its time driver lives
        Some(deadline) => runtime
            .block_on(async move {
                tokio::time::timeout_at(tokio::time::Instant::from_std(deadline.at), fut).await
            })
            .map_err(|_| TimeoutElapsed(deadline.timeout)),
    }
}

/// Run one statement round-trip, mapping both driver errors and expiry to execution failures
fn run_statement<F, T>(
    runtime: &Runtime,
    deadline: Option<Deadline>,
    context: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, tokio_postgres::Error>>,
{
    match block_on(runtime, deadline, fut) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(QueryError::execution_caused(context, e)),
        Err(elapsed) => Err(QueryError::execution_caused(
            format!("{context}: timed out"),
            elapsed,
        )),
    }
}

/// Convert a SqlValue to the PostgreSQL type the server inferred for its placeholder
fn to_postgres_param(param: &Parameter, position: usize, ty: &Type) -> Result<PgParam> {
    let mismatch = || {
        QueryError::parameter_type_mismatch(
            format!("{} for {}", ty.name(), param.label(position)),
            param.value.type_name(),
        )
    };
    let out_of_range = |e: std::num::TryFromIntError| {
        QueryError::execution_caused(
            format!("parameter {} is out of range for {}", param.label(position), ty.name()),
            e,
        )
    };

    let boxed: PgParam = match (&param.value, ty.oid()) {
        (SqlValue::Null, oid) => typed_null(oid).ok_or_else(mismatch)?,
        (SqlValue::Integer(i), POSTGRES_TYPE_OID_INT2) => {
            Box::new(i16::try_from(*i).map_err(out_of_range)?)
        }
        (SqlValue::Integer(i), POSTGRES_TYPE_OID_INT4) => {
            Box::new(i32::try_from(*i).map_err(out_of_range)?)
        }
        (SqlValue::Integer(i), POSTGRES_TYPE_OID_INT8) => Box::new(*i),
        (SqlValue::Integer(i), POSTGRES_TYPE_OID_FLOAT4) => Box::new(*i as f32),
        (SqlValue::Integer(i), POSTGRES_TYPE_OID_FLOAT8) => Box::new(*i as f64),
        (SqlValue::Real(r), POSTGRES_TYPE_OID_FLOAT4) => Box::new(*r as f32),
        (SqlValue::Real(r), POSTGRES_TYPE_OID_FLOAT8) => Box::new(*r),
        (SqlValue::Boolean(b), POSTGRES_TYPE_OID_BOOL) => Box::new(*b),
        (SqlValue::Blob(bytes), POSTGRES_TYPE_OID_BYTEA) => Box::new(bytes.clone()),
        (
            SqlValue::Text(s),
            POSTGRES_TYPE_OID_TEXT
            | POSTGRES_TYPE_OID_VARCHAR
            | POSTGRES_TYPE_OID_BPCHAR
            | POSTGRES_TYPE_OID_NAME
            | POSTGRES_TYPE_OID_UNKNOWN,
        ) => Box::new(s.clone()),
        (SqlValue::Text(s), POSTGRES_TYPE_OID_JSON | POSTGRES_TYPE_OID_JSONB) => {
            let json: serde_json::Value = serde_json::from_str(s).map_err(|e| {
                QueryError::execution_caused(
                    format!("parameter {} is not valid JSON", param.label(position)),
                    e,
                )
            })?;
            Box::new(json)
        }
        (SqlValue::Json(v), POSTGRES_TYPE_OID_JSON | POSTGRES_TYPE_OID_JSONB) => {
            Box::new(v.clone())
        }
        (
            SqlValue::Json(v),
            POSTGRES_TYPE_OID_TEXT | POSTGRES_TYPE_OID_VARCHAR | POSTGRES_TYPE_OID_UNKNOWN,
        ) => Box::new(v.to_string()),
        _ => return Err(mismatch()),
    };
    Ok(boxed)
}

/// A NULL the server accepts for a placeholder of type `oid`
fn typed_null(oid: u32) -> Option<PgParam> {
    let null: PgParam = match oid {
        POSTGRES_TYPE_OID_BOOL => Box::new(None::<bool>),
        POSTGRES_TYPE_OID_INT2 => Box::new(None::<i16>),
        POSTGRES_TYPE_OID_INT4 => Box::new(None::<i32>),
        POSTGRES_TYPE_OID_INT8 => Box::new(None::<i64>),
        POSTGRES_TYPE_OID_FLOAT4 => Box::new(None::<f32>),
        POSTGRES_TYPE_OID_FLOAT8 => Box::new(None::<f64>),
        POSTGRES_TYPE_OID_BYTEA => Box::new(None::<Vec<u8>>),
        POSTGRES_TYPE_OID_JSON | POSTGRES_TYPE_OID_JSONB => Box::new(None::<serde_json::Value>),
        POSTGRES_TYPE_OID_TEXT
        | POSTGRES_TYPE_OID_VARCHAR
        | POSTGRES_TYPE_OID_BPCHAR
        | POSTGRES_TYPE_OID_NAME
        | POSTGRES_TYPE_OID_UNKNOWN => Box::new(None::<String>),
        _ => return None,
    };
    Some(null)
}

/// Convert ordered parameters for a prepared statement, one per placeholder
fn convert_parameters(statement: &Statement, params: &[Parameter]) -> Result<Vec<PgParam>> {
    let types = statement.params();
    if params.is_empty() && !types.is_empty() {
        return Err(QueryError::parameter_not_provided("$1"));
    }
    if types.len() != params.len() {
        return Err(QueryError::execution(format!(
            "statement expects {} parameters, got {}",
            types.len(),
            params.len()
        )));
    }
    params
        .iter()
        .zip(types)
        .enumerate()
        .map(|(position, (param, ty))| to_postgres_param(param, position, ty))
        .collect()
}

fn as_refs(values: &[PgParam]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v.as_ref()).collect()
}

fn column_type_for(ty: &Type) -> ColumnType {
    match ty.oid() {
        POSTGRES_TYPE_OID_BOOL => ColumnType::Boolean,
        POSTGRES_TYPE_OID_INT2 | POSTGRES_TYPE_OID_INT4 | POSTGRES_TYPE_OID_INT8 => {
            ColumnType::Integer
        }
        POSTGRES_TYPE_OID_FLOAT4 | POSTGRES_TYPE_OID_FLOAT8 => ColumnType::Real,
        POSTGRES_TYPE_OID_TEXT
        | POSTGRES_TYPE_OID_VARCHAR
        | POSTGRES_TYPE_OID_BPCHAR
        | POSTGRES_TYPE_OID_NAME => ColumnType::Text,
        POSTGRES_TYPE_OID_BYTEA => ColumnType::Blob,
        POSTGRES_TYPE_OID_JSON | POSTGRES_TYPE_OID_JSONB => ColumnType::Json,
        POSTGRES_TYPE_OID_NUMERIC => ColumnType::Numeric,
        POSTGRES_TYPE_OID_DATE
        | POSTGRES_TYPE_OID_TIME
        | POSTGRES_TYPE_OID_TIMESTAMP
        | POSTGRES_TYPE_OID_TIMESTAMPTZ
        | POSTGRES_TYPE_OID_UUID => ColumnType::Text,
        _ => ColumnType::Unknown,
    }
}

/// Exact decimal text of a `numeric` value, read from its binary wire form
struct PgNumeric(String);

fn numeric_word(raw: &[u8], idx: usize) -> std::result::Result<u16, Box<dyn Error + Sync + Send>> {
    raw.get(idx * 2..idx * 2 + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated numeric value".into())
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        let ndigits = numeric_word(raw, 0)? as usize;
        let weight = i32::from(numeric_word(raw, 1)? as i16);
        let sign = numeric_word(raw, 2)?;
        let dscale = numeric_word(raw, 3)? as usize;
        match sign {
            0xC000 => return Ok(PgNumeric("NaN".to_string())),
            0xD000 => return Ok(PgNumeric("Infinity".to_string())),
            0xF000 => return Ok(PgNumeric("-Infinity".to_string())),
            _ => {}
        }

        // Base-10000 digits; group `weight` is the units group
        let digits = (0..ndigits)
            .map(|i| numeric_word(raw, 4 + i))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let digit = |idx: i32| {
            usize::try_from(idx)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0)
        };

        let mut text = String::new();
        if sign == 0x4000 {
            text.push('-');
        }
        if weight < 0 {
            text.push('0');
        } else {
            for idx in 0..=weight {
                if idx == 0 {
                    text.push_str(&digit(idx).to_string());
                } else {
                    text.push_str(&format!("{:04}", digit(idx)));
                }
            }
        }
        if dscale > 0 {
            let mut fraction = String::new();
            let mut idx = weight + 1;
            while fraction.len() < dscale {
                fraction.push_str(&format!("{:04}", digit(idx)));
                idx += 1;
            }
            fraction.truncate(dscale);
            text.push('.');
            text.push_str(&fraction);
        }
        Ok(PgNumeric(text))
    }

    fn accepts(ty: &Type) -> bool {
        ty.oid() == POSTGRES_TYPE_OID_NUMERIC
    }
}

/// Hyphenated text of a `uuid` value
struct PgUuid(String);

impl<'a> FromSql<'a> for PgUuid {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        if raw.len() != 16 {
            return Err(format!("uuid value has {} bytes, expected 16", raw.len()).into());
        }
        let hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();
        Ok(PgUuid(format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )))
    }

    fn accepts(ty: &Type) -> bool {
        ty.oid() == POSTGRES_TYPE_OID_UUID
    }
}

fn read<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, column: &str) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| {
        QueryError::materialization_caused(format!("cannot read column '{column}'"), e)
    })
}

/// Convert a PostgreSQL column value using OID-based detection for stability
fn value_from_postgres(row: &Row, idx: usize, ty: &Type, column: &str) -> Result<SqlValue> {
    let value = match ty.oid() {
        POSTGRES_TYPE_OID_BOOL => read::<bool>(row, idx, column)?.map(SqlValue::Boolean),
        POSTGRES_TYPE_OID_INT2 => {
            read::<i16>(row, idx, column)?.map(|v| SqlValue::Integer(v.into()))
        }
        POSTGRES_TYPE_OID_INT4 => {
            read::<i32>(row, idx, column)?.map(|v| SqlValue::Integer(v.into()))
        }
        POSTGRES_TYPE_OID_INT8 => read::<i64>(row, idx, column)?.map(SqlValue::Integer),
        POSTGRES_TYPE_OID_FLOAT4 => read::<f32>(row, idx, column)?.map(|v| SqlValue::Real(v.into())),
        POSTGRES_TYPE_OID_FLOAT8 => read::<f64>(row, idx, column)?.map(SqlValue::Real),
        POSTGRES_TYPE_OID_TEXT
        | POSTGRES_TYPE_OID_VARCHAR
        | POSTGRES_TYPE_OID_BPCHAR
        | POSTGRES_TYPE_OID_NAME => read::<String>(row, idx, column)?.map(SqlValue::Text),
        POSTGRES_TYPE_OID_BYTEA => read::<Vec<u8>>(row, idx, column)?.map(SqlValue::Blob),
        POSTGRES_TYPE_OID_JSON | POSTGRES_TYPE_OID_JSONB => {
            read::<serde_json::Value>(row, idx, column)?.map(SqlValue::Json)
        }
        POSTGRES_TYPE_OID_NUMERIC => {
            read::<PgNumeric>(row, idx, column)?.map(|n| SqlValue::Text(n.0))
        }
        POSTGRES_TYPE_OID_UUID => read::<PgUuid>(row, idx, column)?.map(|u| SqlValue::Text(u.0)),
        POSTGRES_TYPE_OID_DATE => {
            read::<NaiveDate>(row, idx, column)?.map(|d| SqlValue::Text(d.to_string()))
        }
        POSTGRES_TYPE_OID_TIME => {
            read::<NaiveTime>(row, idx, column)?.map(|t| SqlValue::Text(t.to_string()))
        }
        POSTGRES_TYPE_OID_TIMESTAMP => read::<NaiveDateTime>(row, idx, column)?
            .map(|ts| SqlValue::Text(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        POSTGRES_TYPE_OID_TIMESTAMPTZ => {
            read::<DateTime<Utc>>(row, idx, column)?.map(|ts| SqlValue::Text(ts.to_rfc3339()))
        }
        _ => {
            return Err(QueryError::materialization(format!(
                "column '{column}' has unsupported PostgreSQL type '{}' (OID {})",
                ty.name(),
                ty.oid()
            )));
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// PostgreSQL backend; the descriptor is a libpq-style connection string or URL.
///
/// Each connection drives its own current-thread tokio runtime, so calls block the
/// calling thread. Calling into this driver from inside an async task that already
/// runs on a tokio runtime panics with "Cannot start a runtime from within a runtime";
/// wrap such calls in `tokio::task::spawn_blocking`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        PostgresDriver
    }
}

impl Driver for PostgresDriver {
    type Connection = PostgresConnection;

    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
        timeout: Option<Duration>,
    ) -> Result<PostgresConnection> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| QueryError::connection_caused("failed to start PostgreSQL runtime", e))?;
        let deadline = Deadline::after(timeout);

        let (client, connection) =
            match block_on(&runtime, deadline, tokio_postgres::connect(descriptor.as_str(), NoTls)) {
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    return Err(QueryError::connection_caused(
                        "cannot connect to PostgreSQL",
                        e,
                    ));
                }
                Err(elapsed) => {
                    return Err(QueryError::connection_caused(
                        "cannot connect to PostgreSQL: timed out",
                        elapsed,
                    ));
                }
            };

        // The connection object performs the actual communication with the database
        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        Ok(PostgresConnection {
            client,
            runtime,
            deadline,
        })
    }

    fn identity_reset_request(
        &self,
        table: &Identifier,
        identity_column: &Identifier,
    ) -> QueryRequest {
        // Like CHECKIDENT: raise the sequence to the column maximum, never lower it
        let sql = format!(
            "SELECT setval(s.seq, GREATEST(\
             COALESCE((SELECT MAX({column}) FROM {table}), 0) + 1, \
             COALESCE(pg_sequence_last_value(s.seq) + 1, 1)), false) AS next_value \
             FROM (SELECT pg_get_serial_sequence(@table_name, @column_name)::regclass AS seq) s",
            column = identity_column.name,
            table = table.qualified(),
        );
        QueryRequest::text(sql)
            .bind(Parameter::named("table_name", table.qualified()))
            .bind(Parameter::named("column_name", identity_column.name.as_str()))
    }
}

/// An open PostgreSQL session with the runtime that drives it
pub struct PostgresConnection {
    // Dropped before `runtime` so the client never outlives its connection task
    client: Client,
    runtime: Runtime,
    deadline: Option<Deadline>,
}

impl PostgresConnection {
    /// SQL with `$n` placeholders and the parameters in placeholder order
    fn resolve(&self, command: &Command, params: &[Parameter]) -> Result<(String, Vec<Parameter>)> {
        match command {
            Command::Text(sql) => match parameters::check_parameters(params)? {
                BindingStyle::Named => {
                    let (rewritten, order) =
                        parameters::rewrite_named_parameters(sql, params, &dollar)?;
                    let ordered = order.into_iter().map(|idx| params[idx].clone()).collect();
                    Ok((rewritten, ordered))
                }
                _ => Ok((sql.clone(), params.to_vec())),
            },
            Command::StoredProcedure(name) => {
                let sql = procedure_call_sql(name, params)?;
                Ok((sql, params.to_vec()))
            }
        }
    }

    fn prepare(&self, sql: &str) -> Result<Statement> {
        run_statement(
            &self.runtime,
            self.deadline,
            "failed to prepare statement",
            self.client.prepare(sql),
        )
    }

    fn execute_many(&mut self, statements: &[String], params: &[Parameter]) -> Result<u64> {
        if parameters::check_parameters(params)? == BindingStyle::Positional {
            return Err(QueryError::execution(
                "positional parameters are ambiguous in a multi-statement batch; use named parameters",
            ));
        }

        let PostgresConnection {
            client,
            runtime,
            deadline,
        } = self;
        let deadline = *deadline;
        let tx = run_statement(
            runtime,
            deadline,
            "failed to begin batch transaction",
            client.transaction(),
        )?;

        let mut total = 0;
        let mut used = HashSet::new();
        for statement in statements {
            let names = parameters::extract_parameters_in_statement(statement);
            let subset: Vec<Parameter> = params
                .iter()
                .enumerate()
                .filter(|(_, p)| p.name.as_ref().is_some_and(|n| names.contains(n)))
                .map(|(position, p)| {
                    used.insert(position);
                    p.clone()
                })
                .collect();

            let (sql, order) = parameters::rewrite_named_parameters(statement, &subset, &dollar)?;
            let ordered: Vec<Parameter> = order.into_iter().map(|idx| subset[idx].clone()).collect();

            let prepared = run_statement(
                runtime,
                deadline,
                "failed to prepare batch statement",
                tx.prepare(&sql),
            )?;
            let values = convert_parameters(&prepared, &ordered)?;
            total += run_statement(
                runtime,
                deadline,
                "batch statement failed",
                tx.execute(&prepared, &as_refs(&values)),
            )?;
        }

        if let Some((position, unused)) = params
            .iter()
            .enumerate()
            .find(|(position, _)| !used.contains(position))
        {
            return Err(QueryError::execution(format!(
                "parameter {} is not used by the statement",
                unused.label(position)
            )));
        }

        run_statement(
            runtime,
            deadline,
            "failed to commit batch transaction",
            tx.commit(),
        )?;
        Ok(total)
    }
}

/// `SELECT * FROM name($1, p => $2)` for a set-returning or scalar function
fn procedure_call_sql(name: &str, params: &[Parameter]) -> Result<String> {
    let function = Identifier::parse(name)?;
    let style = parameters::check_parameters(params)?;

    let mut args = Vec::with_capacity(params.len());
    for (position, param) in params.iter().enumerate() {
        let placeholder = dollar(position + 1);
        match (style, &param.name) {
            (BindingStyle::Named, Some(arg_name)) => {
                let arg = Identifier::parse(arg_name)?;
                if arg.schema.is_some() {
                    return Err(QueryError::execution(format!(
                        "invalid argument name '{arg_name}'"
                    )));
                }
                args.push(format!("{} => {placeholder}", arg.name));
            }
            _ => args.push(placeholder),
        }
    }

    Ok(format!(
        "SELECT * FROM {}({})",
        function.qualified(),
        args.join(", ")
    ))
}

impl DriverConnection for PostgresConnection {
    fn is_open(&self) -> bool {
        !self.client.is_closed()
    }

    fn probe(&mut self) -> Result<()> {
        match block_on(&self.runtime, self.deadline, self.client.simple_query("SELECT 1")) {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(QueryError::connection_caused(
                "PostgreSQL server did not answer the probe",
                e,
            )),
            Err(elapsed) => Err(QueryError::connection_caused(
                "PostgreSQL server did not answer the probe in time",
                elapsed,
            )),
        }
    }

    fn fetch(
        &mut self,
        command: &Command,
        params: &[Parameter],
        limit: RowLimit,
    ) -> Result<ResultTable> {
        let (sql, params) = self.resolve(command, params)?;
        let statement = self.prepare(&sql)?;
        let values = convert_parameters(&statement, &params)?;
        let rows = run_statement(
            &self.runtime,
            self.deadline,
            "query failed",
            self.client.query(&statement, &as_refs(&values)),
        )?;

        let mut cursor = PostgresCursor {
            columns: statement
                .columns()
                .iter()
                .map(|c| {
                    Column::new(
                        c.name(),
                        Some(c.type_().name().to_string()),
                        column_type_for(c.type_()),
                    )
                })
                .collect(),
            types: statement.columns().iter().map(|c| c.type_().clone()).collect(),
            rows: rows.into_iter(),
        };
        materialize(&mut cursor, limit)
    }

    fn execute(&mut self, command: &Command, params: &[Parameter]) -> Result<u64> {
        if let Command::Text(sql) = command {
            let statements = split_sql_statements(sql);
            if statements.len() > 1 {
                return self.execute_many(&statements, params);
            }
        }

        let (sql, params) = self.resolve(command, params)?;
        let statement = self.prepare(&sql)?;
        let values = convert_parameters(&statement, &params)?;
        run_statement(
            &self.runtime,
            self.deadline,
            "statement failed",
            self.client.execute(&statement, &as_refs(&values)),
        )
    }
}

struct PostgresCursor {
    columns: Vec<Column>,
    types: Vec<Type>,
    rows: std::vec::IntoIter<Row>,
}

impl Cursor for PostgresCursor {
    fn columns(&self) -> Vec<Column> {
        self.columns.clone()
    }

    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        let Some(row) = self.rows.next() else {
            return Ok(None);
        };
        self.columns
            .iter()
            .zip(&self.types)
            .enumerate()
            .map(|(idx, (column, ty))| value_from_postgres(&row, idx, ty, &column.name))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}
