//! Diagnostics boundary of the executor.
//!
//! The executor never writes files or talks to a user directly. It hands
//! every failure and notable event to a [`DiagnosticsSink`], which decides
//! where the structured record goes and whether a human should see it.

use crate::result::{FailureKind, QueryError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where an error happened and whether it should be surfaced to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub title: String,
    pub module: String,
    pub display_to_user: bool,
}

impl ErrorContext {
    pub fn new(title: impl Into<String>, module: impl Into<String>, display_to_user: bool) -> Self {
        ErrorContext {
            title: title.into(),
            module: module.into(),
            display_to_user,
        }
    }
}

/// Capability the executor reports through
pub trait DiagnosticsSink: Send + Sync {
    fn report_error(&self, error: &QueryError, context: &ErrorContext);

    fn report_info(&self, message: &str, display_to_user: bool);
}

/// External collaborator that shows messages to a human
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

impl<F> Notifier for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn notify(&self, title: &str, message: &str) {
        self(title, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Error,
    Info,
}

/// Structured form of one diagnostic event, ready for a log collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticRecord {
    pub timestamp: DateTime<Utc>,
    pub level: DiagnosticLevel,
    pub module: Option<String>,
    pub title: Option<String>,
    pub kind: Option<FailureKind>,
    pub message: String,
    /// Error display plus its cause chain
    pub detail: Option<String>,
    pub display_to_user: bool,
}

impl DiagnosticRecord {
    pub fn from_error(error: &QueryError, context: &ErrorContext) -> Self {
        DiagnosticRecord {
            timestamp: Utc::now(),
            level: DiagnosticLevel::Error,
            module: Some(context.module.clone()),
            title: Some(context.title.clone()),
            kind: Some(error.kind()),
            message: error.to_string(),
            detail: Some(error.detail()),
            display_to_user: context.display_to_user,
        }
    }

    pub fn info(message: &str, display_to_user: bool) -> Self {
        DiagnosticRecord {
            timestamp: Utc::now(),
            level: DiagnosticLevel::Info,
            module: None,
            title: None,
            kind: None,
            message: message.to_string(),
            detail: None,
            display_to_user,
        }
    }

    /// Text a notifier shows: `"{title}: {message}"` for errors, the bare message otherwise
    pub fn user_message(&self) -> String {
        match &self.title {
            Some(title) => format!("{title}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

/// Emits diagnostics as `tracing` events and forwards user-facing ones to a notifier
#[derive(Clone, Default)]
pub struct TracingSink {
    notifier: Option<Arc<dyn Notifier>>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn forward(&self, caption: &str, record: &DiagnosticRecord) {
        if !record.display_to_user {
            return;
        }
        if let Some(notifier) = &self.notifier {
            notifier.notify(caption, &record.user_message());
        }
    }
}

impl DiagnosticsSink for TracingSink {
    fn report_error(&self, error: &QueryError, context: &ErrorContext) {
        let record = DiagnosticRecord::from_error(error, context);
        tracing::error!(
            module = %context.module,
            title = %context.title,
            kind = %error.kind(),
            detail = record.detail.as_deref().unwrap_or_default(),
            "{}",
            record.message
        );
        self.forward(&context.title, &record);
    }

    fn report_info(&self, message: &str, display_to_user: bool) {
        let record = DiagnosticRecord::info(message, display_to_user);
        tracing::info!(display_to_user, "{}", message);
        self.forward("Information", &record);
    }
}

/// Keeps every record in memory; used for headless runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<DiagnosticRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DiagnosticRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.lock().clone()
    }

    pub fn errors(&self) -> Vec<DiagnosticRecord> {
        self.by_level(DiagnosticLevel::Error)
    }

    pub fn infos(&self) -> Vec<DiagnosticRecord> {
        self.by_level(DiagnosticLevel::Info)
    }

    fn by_level(&self, level: DiagnosticLevel) -> Vec<DiagnosticRecord> {
        self.lock()
            .iter()
            .filter(|r| r.level == level)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl DiagnosticsSink for MemorySink {
    fn report_error(&self, error: &QueryError, context: &ErrorContext) {
        self.lock().push(DiagnosticRecord::from_error(error, context));
    }

    fn report_info(&self, message: &str, display_to_user: bool) {
        self.lock().push(DiagnosticRecord::info(message, display_to_user));
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn report_error(&self, _error: &QueryError, _context: &ErrorContext) {}

    fn report_info(&self, _message: &str, _display_to_user: bool) {}
}
