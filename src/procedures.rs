use crate::{
    parameters::{self, BindingStyle, Parameter, ParameterType},
    result::{QueryError, Result},
};
use std::collections::HashMap;
use std::fs;
use std::str::FromStr;

/// A parameter declared by a procedure's SQL (`@name`)
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureParameter {
    pub name: String,
    pub param_type: Option<ParameterType>,
}

/// Named SQL that stands in for a stored procedure on backends without them
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureDef {
    pub sql: String,
    /// In order of first appearance in `sql`
    pub parameters: Vec<ProcedureParameter>,
}

impl ProcedureDef {
    /// Create a new ProcedureDef from SQL and an optional args object
    pub fn from_sql(
        sql: &str,
        args: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> anyhow::Result<Self> {
        let names = parameters::extract_parameters_in_statement(sql);

        if let Some(args) = args {
            if let Some(stray) = args.keys().find(|key| !names.contains(*key)) {
                anyhow::bail!("args defines '{stray}' but the query has no @{stray} parameter");
            }
        }

        let mut declared = Vec::with_capacity(names.len());
        for name in names {
            let param_type = match args.and_then(|a| a.get(&name)) {
                Some(arg_def) => Self::parse_arg_type(&name, arg_def)?,
                None => None,
            };
            declared.push(ProcedureParameter { name, param_type });
        }

        Ok(ProcedureDef {
            sql: sql.to_string(),
            parameters: declared,
        })
    }

    fn parse_arg_type(
        name: &str,
        arg_def: &serde_json::Value,
    ) -> anyhow::Result<Option<ParameterType>> {
        let arg_obj = arg_def
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("args entry for '{name}' must be an object"))?;
        match arg_obj.get("type") {
            None => Ok(None),
            Some(serde_json::Value::String(type_str)) => {
                Ok(Some(ParameterType::from_str(type_str)?))
            }
            Some(other) => anyhow::bail!("type of '{name}' must be a string, got {other}"),
        }
    }

    /// Map caller-supplied parameters onto the declared ones
    ///
    /// Positional parameters bind in declaration order, named ones by name. The
    /// result is a named parameter list carrying the declared types.
    pub fn bind(&self, supplied: &[Parameter]) -> Result<Vec<Parameter>> {
        let style = parameters::check_parameters(supplied)?;
        if supplied.len() != self.parameters.len() {
            return Err(QueryError::execution(format!(
                "procedure expects {} parameters, got {}",
                self.parameters.len(),
                supplied.len()
            )));
        }

        let mut bound = Vec::with_capacity(self.parameters.len());
        for (position, declared) in self.parameters.iter().enumerate() {
            let value = match style {
                BindingStyle::Named => supplied
                    .iter()
                    .find(|p| p.name.as_deref() == Some(declared.name.as_str()))
                    .ok_or_else(|| {
                        QueryError::parameter_not_provided(format!("@{}", declared.name))
                    })?,
                _ => &supplied[position],
            };

            let param_type = value.sql_type.or(declared.param_type);
            let mut param = Parameter::named(&declared.name, value.value.clone());
            param.sql_type = param_type;
            bound.push(param);
        }

        parameters::check_parameters(&bound)?;
        Ok(bound)
    }
}

/// Collection of procedure definitions loaded from JSON configuration
#[derive(Debug, Clone, Default)]
pub struct ProcedureCatalog {
    /// Procedure definitions keyed by name
    pub definitions: HashMap<String, ProcedureDef>,
}

impl ProcedureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load procedure definitions from a JSON file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let json: serde_json::Value = serde_json::from_str(&content)?;
        Self::from_json(json)
    }

    /// Load procedure definitions from a serde_json::Value object
    ///
    /// ```json
    /// { "get_user": { "query": "SELECT * FROM users WHERE id = @id",
    ///                 "args": { "id": { "type": "integer" } } } }
    /// ```
    pub fn from_json(json: serde_json::Value) -> anyhow::Result<Self> {
        let json_map = json
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("procedure catalog must be a JSON object, got {json}"))?;

        let mut catalog = ProcedureCatalog::new();
        for (name, value) in json_map {
            let map = value
                .as_object()
                .ok_or_else(|| anyhow::anyhow!("procedure '{name}' must be an object"))?;
            let sql = map
                .get("query")
                .and_then(|q| q.as_str())
                .ok_or_else(|| anyhow::anyhow!("procedure '{name}' is missing a 'query' string"))?;
            let args = map.get("args").and_then(|a| a.as_object());
            catalog.insert(name.clone(), ProcedureDef::from_sql(sql, args)?);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, name: impl Into<String>, def: ProcedureDef) {
        self.definitions.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Result<&ProcedureDef> {
        self.definitions
            .get(name)
            .ok_or_else(|| QueryError::execution(format!("procedure not found: {name}")))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
