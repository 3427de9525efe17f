//! Quarantine of malformed source rows.
//!
//! A row that cannot be parsed is excluded from its batch, never silently:
//! every exclusion is recorded with its origin and a reason. Records flow
//! to pluggable sinks so operators can persist them to a file, a table, or
//! wherever triage happens.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A sink that receives quarantine records. Implement this to forward
/// records to a file, database, or other persistent store.
pub trait QuarantineSink: Send {
    /// Record one excluded row. Called once per quarantined row.
    fn record(&mut self, record: QuarantineRecord);
}

/// A permanent record of one excluded source row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// The landing file the row came from.
    pub file_id: String,
    /// 1-based line number within the file (the header is line 1).
    pub line: usize,
    /// Why the row was excluded.
    pub reason: String,
    /// When the exclusion was recorded.
    pub timestamp: DateTime<Utc>,
}

impl QuarantineRecord {
    pub fn new(file_id: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            line,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Writes quarantine records as JSON lines (one per record) to a file.
/// Creates the file if it doesn't exist; appends if it does.
pub struct FileQuarantineSink {
    file: std::fs::File,
}

impl FileQuarantineSink {
    /// Open or create a file for append-only quarantine logging.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl QuarantineSink for FileQuarantineSink {
    fn record(&mut self, record: QuarantineRecord) {
        // The sink trait is infallible, but a record that cannot be
        // persisted must still be operator-visible somewhere.
        match serde_json::to_string(&record) {
            Ok(line) => {
                if let Err(err) = writeln!(self.file, "{line}").and_then(|_| self.file.flush()) {
                    warn!(
                        file_id = %record.file_id,
                        line = record.line,
                        %err,
                        "failed to persist quarantine record"
                    );
                }
            }
            Err(err) => {
                warn!(file_id = %record.file_id, line = record.line, %err,
                    "failed to serialize quarantine record");
            }
        }
    }
}

/// Collects records in memory. Useful in tests and for small batch runs
/// where the caller inspects exclusions directly.
#[derive(Default)]
pub struct MemoryQuarantineSink {
    records: Vec<QuarantineRecord>,
}

impl MemoryQuarantineSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[QuarantineRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl QuarantineSink for MemoryQuarantineSink {
    fn record(&mut self, record: QuarantineRecord) {
        self.records.push(record);
    }
}
