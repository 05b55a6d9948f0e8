//! Observability side channel for reconciliation sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

/// What was wrong with an attempt that triggered a retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Defect {
    MissingFields { fields: Vec<String> },
    ParseError { message: String, excerpt: String },
}

impl Defect {
    pub fn summary(&self) -> String {
        match self {
            Defect::MissingFields { fields } => {
                format!("missing or incomplete fields: {}", fields.join(", "))
            }
            Defect::ParseError { message, .. } => format!("unparseable response: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Attempt whose defect caused the retry.
    pub attempt: usize,
    pub at: DateTime<Utc>,
    pub defect: Defect,
}

/// Append-only, attempt-ordered record of retry transitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompensationLog {
    entries: Vec<LogEntry>,
}

impl CompensationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the log and return it with one more entry.
    pub fn appended(mut self, attempt: usize, defect: Defect) -> Self {
        debug_assert!(self.entries.last().is_none_or(|last| last.attempt < attempt));
        self.entries.push(LogEntry {
            attempt,
            at: Utc::now(),
            defect,
        });
        self
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fire-and-forget logger, keyed by agent role.
pub trait LogSink: Send + Sync {
    fn log(&self, role: &str, message: &str, data: Option<&Value>);
}

/// Forwards to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, role: &str, message: &str, data: Option<&Value>) {
        match data {
            Some(data) => tracing::info!(role, data = %data, "{}", message),
            None => tracing::info!(role, "{}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _role: &str, _message: &str, _data: Option<&Value>) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    pub role: String,
    pub message: String,
    pub data: Option<Value>,
}

/// Keeps every record in memory, for tests and the CLI's report.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SinkRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }
}

impl LogSink for MemorySink {
    fn log(&self, role: &str, message: &str, data: Option<&Value>) {
        let record = SinkRecord {
            role: role.to_string(),
            message: message.to_string(),
            data: data.cloned(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
