use crate::{
    result::{QueryError, Result},
    str_utils::is_in_quotes,
    value::SqlValue,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

// Regex compiled once as a lazy static for performance
pub static PARAMETER_REGEX: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r"@(\w+)").unwrap());

/// Declared SQL type of a statement parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Json,
}

impl FromStr for ParameterType {
    type Err = QueryError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" => Ok(ParameterType::Integer),
            "real" | "float" | "double" => Ok(ParameterType::Real),
            "text" | "string" => Ok(ParameterType::Text),
            "blob" | "bytes" => Ok(ParameterType::Blob),
            "boolean" | "bool" => Ok(ParameterType::Boolean),
            "json" => Ok(ParameterType::Json),
            _ => Err(QueryError::parameter_type_mismatch(
                "integer, real, text, blob, boolean or json",
                s,
            )),
        }
    }
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParameterType::Integer => "integer",
            ParameterType::Real => "real",
            ParameterType::Text => "text",
            ParameterType::Blob => "blob",
            ParameterType::Boolean => "boolean",
            ParameterType::Json => "json",
        };
        write!(f, "{s}")
    }
}

impl ParameterType {
    /// NULL is accepted by every type; integers are accepted where reals are declared
    pub fn accepts(&self, value: &SqlValue) -> bool {
        matches!(
            (self, value),
            (_, SqlValue::Null)
                | (ParameterType::Integer, SqlValue::Integer(_))
                | (ParameterType::Real, SqlValue::Real(_) | SqlValue::Integer(_))
                | (ParameterType::Text, SqlValue::Text(_))
                | (ParameterType::Blob, SqlValue::Blob(_))
                | (ParameterType::Boolean, SqlValue::Boolean(_))
                | (ParameterType::Json, SqlValue::Json(_))
        )
    }
}

/// A statement parameter: optional name, value, optional declared type
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Bare name without the `@`, `:` or `$` prefix; `None` binds by position
    pub name: Option<String>,
    pub value: SqlValue,
    pub sql_type: Option<ParameterType>,
}

impl Parameter {
    pub fn positional(value: impl Into<SqlValue>) -> Self {
        Parameter {
            name: None,
            value: value.into(),
            sql_type: None,
        }
    }

    /// A leading `@`, `:` or `$` on `name` is stripped
    pub fn named(name: impl AsRef<str>, value: impl Into<SqlValue>) -> Self {
        let name = name.as_ref().trim_start_matches(['@', ':', '$']);
        Parameter {
            name: Some(name.to_string()),
            value: value.into(),
            sql_type: None,
        }
    }

    pub fn with_type(mut self, sql_type: ParameterType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Human-readable label used in error messages
    pub fn label(&self, position: usize) -> String {
        match &self.name {
            Some(name) => format!("@{name}"),
            None => format!("#{}", position + 1),
        }
    }

    fn check_declared_type(&self, position: usize) -> Result<()> {
        match self.sql_type {
            Some(sql_type) if !sql_type.accepts(&self.value) => {
                Err(QueryError::parameter_type_mismatch(
                    format!("{sql_type} for {}", self.label(position)),
                    self.value.type_name(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// How a parameter list binds to placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStyle {
    None,
    Positional,
    Named,
}

/// Validate a parameter list: uniform binding style, unique names, declared types honoured
pub fn check_parameters(params: &[Parameter]) -> Result<BindingStyle> {
    let named = params.iter().filter(|p| p.name.is_some()).count();
    let style = match (params.len(), named) {
        (0, _) => BindingStyle::None,
        (total, n) if n == total => BindingStyle::Named,
        (_, 0) => BindingStyle::Positional,
        _ => {
            return Err(QueryError::execution(
                "cannot mix named and positional parameters in one statement",
            ));
        }
    };

    let mut seen = HashSet::new();
    for (position, param) in params.iter().enumerate() {
        if let Some(name) = &param.name {
            if !seen.insert(name.as_str()) {
                return Err(QueryError::execution(format!(
                    "parameter @{name} supplied more than once"
                )));
            }
        }
        param.check_declared_type(position)?;
    }

    Ok(style)
}

/// Helper function to extract unique parameter names with regex, respecting quotes
/// Returns in order of first appearance in the SQL
pub fn extract_parameters_with_regex(statement: &str, regex: &Regex) -> Vec<String> {
    let mut params = Vec::new();
    let mut seen = HashSet::new();

    for cap in regex.captures_iter(statement) {
        if let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) {
            if !is_in_quotes(statement, whole.start()) && seen.insert(name.as_str()) {
                params.push(name.as_str().to_string());
            }
        }
    }

    params
}

/// Extract `@name` parameter names from a single statement
pub fn extract_parameters_in_statement(statement: &str) -> Vec<String> {
    extract_parameters_with_regex(statement, &PARAMETER_REGEX)
}

/// Replace `@name` placeholders outside quotes with numbered ones produced by `placeholder_gen`
///
/// Returns the rewritten SQL and, for each numbered placeholder in order, the index
/// into `params` of the value it binds. Every placeholder must have a parameter and
/// every parameter must be used.
pub fn rewrite_named_parameters(
    statement: &str,
    params: &[Parameter],
    placeholder_gen: &dyn Fn(usize) -> String,
) -> Result<(String, Vec<usize>)> {
    let mut rewritten = String::with_capacity(statement.len());
    let mut order: Vec<usize> = Vec::new();
    let mut last_end = 0;

    for cap in PARAMETER_REGEX.captures_iter(statement) {
        let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if is_in_quotes(statement, whole.start()) {
            continue;
        }

        let param_idx = params
            .iter()
            .position(|p| p.name.as_deref() == Some(name.as_str()))
            .ok_or_else(|| QueryError::parameter_not_provided(format!("@{}", name.as_str())))?;
        let placeholder_idx = match order.iter().position(|&idx| idx == param_idx) {
            Some(existing) => existing + 1,
            None => {
                order.push(param_idx);
                order.len()
            }
        };

        rewritten.push_str(&statement[last_end..whole.start()]);
        rewritten.push_str(&placeholder_gen(placeholder_idx));
        last_end = whole.end();
    }
    rewritten.push_str(&statement[last_end..]);

    if let Some((position, unused)) = params
        .iter()
        .enumerate()
        .find(|(idx, _)| !order.contains(idx))
    {
        return Err(QueryError::execution(format!(
            "parameter {} is not used by the statement",
            unused.label(position)
        )));
    }

    Ok((rewritten, order))
}
