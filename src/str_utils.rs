/// Utility functions for string processing, particularly SQL statement handling
use crate::result::{QueryError, Result};

/// Check if a position in SQL is inside quotes (handles both single and double quotes)
pub fn is_in_quotes(sql: &str, pos: usize) -> bool {
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for ch in sql[..pos.min(sql.len())].chars() {
        match ch {
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            _ => {}
        }
    }

    in_single_quote || in_double_quote
}

/// Split multi-statement SQL into individual statements (respects quote boundaries).
/// `--` and `/* */` comments are dropped, so a piece holding only a comment is not a statement.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current_statement = String::new();
    let mut in_string = false;
    let mut string_char = '"';
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_string {
            if ch == string_char {
                in_string = false;
            }
        } else if ch == '"' || ch == '\'' {
            in_string = true;
            string_char = ch;
        } else if ch == '-' && chars.peek() == Some(&'-') {
            for skipped in chars.by_ref() {
                if skipped == '\n' {
                    break;
                }
            }
            current_statement.push('\n');
            continue;
        } else if ch == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = '\0';
            for skipped in chars.by_ref() {
                if prev == '*' && skipped == '/' {
                    break;
                }
                prev = skipped;
            }
            current_statement.push(' ');
            continue;
        } else if ch == ';' {
            let trimmed = current_statement.trim();
            if !trimmed.is_empty() {
                statements.push(trimmed.to_string());
            }
            current_statement.clear();
            continue;
        }

        current_statement.push(ch);
    }

    let trimmed = current_statement.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }

    statements
}

fn is_valid_identifier_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A validated SQL identifier, optionally qualified by one schema name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub schema: Option<String>,
    pub name: String,
}

impl Identifier {
    /// Accepts `name` or `schema.name`, each part made of ASCII letters, digits
    /// and underscores and not starting with a digit. Nothing else is allowed,
    /// so a validated identifier can be placed in SQL text without escaping.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || {
            QueryError::execution(format!(
                "invalid identifier '{raw}': expected letters, digits and underscores, optionally schema-qualified"
            ))
        };
        let mut parts = raw.split('.');
        let first = parts.next().ok_or_else(invalid)?;
        let second = parts.next();
        if parts.next().is_some() {
            return Err(invalid());
        }

        let (schema, name) = match second {
            Some(name) => (Some(first), name),
            None => (None, first),
        };
        if !is_valid_identifier_segment(name)
            || schema.is_some_and(|s| !is_valid_identifier_segment(s))
        {
            return Err(invalid());
        }

        Ok(Identifier {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        })
    }

    /// Double-quoted rendering, e.g. `"main"."users"`
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{schema}\".\"{}\"", self.name),
            None => format!("\"{}\"", self.name),
        }
    }

    /// Unquoted rendering, e.g. `public.users`
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }
}
