//! Turns a driver cursor into an in-memory `ResultTable`.
//!
//! Materialization is eager: the cursor is drained (or stopped after the
//! first row for single-row requests) before anything is returned, so no
//! driver handle outlives the call that produced it.

use crate::{
    result::Result,
    table::{Column, ResultTable, Schema},
    value::{ColumnType, SqlValue},
};

/// How many rows to pull from a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLimit {
    First,
    All,
}

/// Forward-only view over a statement's result rows
pub trait Cursor {
    /// Column layout, available before the first row is fetched
    fn columns(&self) -> Vec<Column>;

    /// Next row's values in column order, `None` once exhausted
    fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>>;
}

/// Drain `cursor` into a table, honouring `limit`
pub fn materialize<C: Cursor + ?Sized>(cursor: &mut C, limit: RowLimit) -> Result<ResultTable> {
    let mut columns = cursor.columns();
    let mut rows = Vec::new();

    while let Some(values) = cursor.next_row()? {
        rows.push(values);
        if limit == RowLimit::First {
            break;
        }
    }

    infer_unknown_types(&mut columns, &rows);
    ResultTable::from_values(Schema::new(columns), rows)
}

/// Columns without a declared type take the type of their first non-null value
fn infer_unknown_types(columns: &mut [Column], rows: &[Vec<SqlValue>]) {
    for (idx, column) in columns.iter_mut().enumerate() {
        if column.column_type != ColumnType::Unknown {
            continue;
        }
        if let Some(inferred) = rows
            .iter()
            .filter_map(|row| row.get(idx))
            .find_map(SqlValue::column_type)
        {
            column.column_type = inferred;
        }
    }
}
