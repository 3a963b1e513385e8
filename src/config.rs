use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Statement and connect timeout applied when a call does not specify one
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Executor settings, loadable from JSON. Connection strings are not part of it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Default timeout for every operation; `0` disables the bound
    pub default_timeout_ms: u64,
    /// Module name stamped on error diagnostics
    pub module: String,
    /// Whether error diagnostics ask to be shown to the user
    pub display_errors: bool,
    /// Column whose sequence `reset_identity` reseeds on PostgreSQL
    pub identity_column: String,
    pub sqlite: SqliteSettings,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            module: "QueryExecutor".to_string(),
            display_errors: true,
            identity_column: "id".to_string(),
            sqlite: SqliteSettings::default(),
        }
    }
}

impl ExecutorConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let json: serde_json::Value = serde_json::from_str(&content)?;
        Self::from_json(json)
    }

    /// Load configuration from a serde_json::Value object; missing keys keep their defaults
    pub fn from_json(json: serde_json::Value) -> anyhow::Result<Self> {
        Ok(serde_json::from_value(json)?)
    }

    /// `None` when timeouts are disabled
    pub fn default_timeout(&self) -> Option<Duration> {
        match self.default_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// A per-call timeout wins over the default; a zero per-call timeout disables the bound
    pub fn resolve_timeout(&self, requested: Option<Duration>) -> Option<Duration> {
        match requested {
            Some(timeout) if timeout.is_zero() => None,
            Some(timeout) => Some(timeout),
            None => self.default_timeout(),
        }
    }
}

/// SQLite-specific connection settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteSettings {
    /// Create the database file when it does not exist; otherwise a missing file is a connection failure
    pub create_if_missing: bool,
    /// How long a statement waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        SqliteSettings {
            create_if_missing: false,
            busy_timeout_ms: 5_000,
        }
    }
}
