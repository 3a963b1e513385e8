use crate::{
    result::{QueryError, Result},
    value::{ColumnType, SqlValue},
};
use serde::{Serialize, Serializer, ser::SerializeMap};
use std::sync::Arc;

/// One column of a result set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    /// Type name exactly as the driver reported it, if any
    pub declared_type: Option<String>,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, declared_type: Option<String>, column_type: ColumnType) -> Self {
        Column {
            name: name.into(),
            declared_type,
            column_type,
        }
    }
}

/// Column layout shared by every row of one result set
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Schema { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of the first column called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// A single result row: column names mapped to values, in result set order
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    schema: Arc<Schema>,
    values: Vec<SqlValue>,
}

impl ResultRow {
    /// Build a row, rejecting values that do not line up with the schema
    pub fn new(schema: Arc<Schema>, values: Vec<SqlValue>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(QueryError::materialization(format!(
                "row has {} values but the result schema has {} columns",
                values.len(),
                schema.len()
            )));
        }
        Ok(ResultRow { schema, values })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.schema.index_of(column).map(|idx| &self.values[idx])
    }

    pub fn get_index(&self, idx: usize) -> Option<&SqlValue> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(column name, value)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.schema.names().zip(self.values.iter())
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Order-preserving JSON object of this row
    pub fn to_json(&self) -> serde_json::Value {
        let obj: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect();
        serde_json::Value::Object(obj)
    }
}

impl Serialize for ResultRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A fully materialized result set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    schema: Arc<Schema>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Build a table from raw value rows; every row must match the schema's arity
    pub fn from_values(schema: Schema, rows: Vec<Vec<SqlValue>>) -> Result<Self> {
        let schema = Arc::new(schema);
        let rows = rows
            .into_iter()
            .map(|values| ResultRow::new(Arc::clone(&schema), values))
            .collect::<Result<Vec<_>>>()?;
        Ok(ResultTable { schema, rows })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&ResultRow> {
        self.rows.first()
    }

    /// First row, `None` when the result set was empty
    pub fn into_first(self) -> Option<ResultRow> {
        self.rows.into_iter().next()
    }

    pub fn into_rows(self) -> Vec<ResultRow> {
        self.rows
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(self.rows.iter().map(ResultRow::to_json).collect())
    }
}
