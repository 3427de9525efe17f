//! Durable ingest ledger: which source files have been fully committed.
//!
//! The ledger is the exactly-once guard for the ingestion path. Every state
//! transition is appended as one JSON line to the ledger file and the file
//! is replayed on open, last entry per (file_id, fingerprint) winning. A
//! file is identified by its name *and* its content fingerprint — replacing
//! a file's content produces a new logical file, resubmitting identical
//! content does not.
//!
//! Entry lifecycle:
//!
//! ```text
//! (absent) --claim--> claimed --commit--> committed
//!                        |
//!                        +----abandon---> abandoned   (never retried)
//! ```
//!
//! A `claimed` entry left behind by a crashed run is re-claimable on the
//! next open; `committed` and `abandoned` are terminal. `claim` is atomic
//! across pipeline instances sharing this ledger: the in-flight set is
//! checked and updated under one lock, so two instances never both own the
//! same file — the loser observes a conflict and skips.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RowvaultError;

/// Commit status of one logical source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    /// Claimed for processing; not yet durable in the protected store.
    Claimed,
    /// Protected batch durably written; the file will never be re-admitted.
    Committed,
    /// Unrecoverable failure, recorded with a reason. Never auto-retried.
    Abandoned,
}

/// One ledger state transition, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub file_id: String,
    /// Content fingerprint (SHA-256 hex of the file bytes).
    pub fingerprint: String,
    pub status: LedgerStatus,
    pub timestamp: DateTime<Utc>,
    /// Commit sequence number, present once committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_seq: Option<u64>,
    /// Failure reason, present once abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now owns the file and must commit or abandon it.
    Claimed,
    /// This exact (file_id, fingerprint) is already committed. Skip.
    AlreadyCommitted,
    /// The file was abandoned earlier. Skip; re-admission is an operator
    /// decision, never automatic.
    Abandoned,
    /// Another live pipeline instance owns the file right now. Expected
    /// under concurrency; skip.
    Conflict,
}

type FileKey = (String, String);

struct LedgerState {
    entries: HashMap<FileKey, LedgerEntry>,
    /// Claims held by live pipeline instances sharing this ledger. Not
    /// persisted: after a crash the set is empty, so stale `claimed`
    /// entries become re-claimable.
    in_flight: HashSet<FileKey>,
}

/// Durable, append-only claim/commit ledger.
pub struct IngestLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl IngestLedger {
    /// Open a ledger file, creating it if absent, and replay its entries.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RowvaultError> {
        let path = path.as_ref().to_path_buf();
        let mut entries = HashMap::new();

        if path.exists() {
            let file = std::fs::File::open(&path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: LedgerEntry = serde_json::from_str(&line).map_err(|e| {
                    RowvaultError::StructuralParse(format!("ledger entry: {}", e))
                })?;
                entries.insert((entry.file_id.clone(), entry.fingerprint.clone()), entry);
            }
        }

        Ok(Self {
            path,
            state: Mutex::new(LedgerState {
                entries,
                in_flight: HashSet::new(),
            }),
        })
    }

    /// Claim a file for processing. Atomic: of any number of concurrent
    /// callers, exactly one gets `Claimed`.
    pub fn claim(&self, file_id: &str, fingerprint: &str) -> Result<ClaimOutcome, RowvaultError> {
        let key = (file_id.to_string(), fingerprint.to_string());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match state.entries.get(&key).map(|e| e.status) {
            Some(LedgerStatus::Committed) => return Ok(ClaimOutcome::AlreadyCommitted),
            Some(LedgerStatus::Abandoned) => return Ok(ClaimOutcome::Abandoned),
            _ => {}
        }
        if state.in_flight.contains(&key) {
            debug!(file_id, fingerprint, "claim conflict, file owned by another instance");
            return Ok(ClaimOutcome::Conflict);
        }

        let entry = LedgerEntry {
            file_id: file_id.to_string(),
            fingerprint: fingerprint.to_string(),
            status: LedgerStatus::Claimed,
            timestamp: Utc::now(),
            batch_seq: None,
            reason: None,
        };
        Self::append(&self.path, &entry)?;
        state.in_flight.insert(key.clone());
        state.entries.insert(key, entry);
        Ok(ClaimOutcome::Claimed)
    }

    /// Mark a file committed. Idempotent: committing an already-committed
    /// (file_id, fingerprint) is a no-op, which makes the commit step
    /// itself safe to retry.
    pub fn commit(
        &self,
        file_id: &str,
        fingerprint: &str,
        batch_seq: u64,
    ) -> Result<(), RowvaultError> {
        let key = (file_id.to_string(), fingerprint.to_string());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = state.entries.get(&key) {
            if existing.status == LedgerStatus::Committed {
                state.in_flight.remove(&key);
                return Ok(());
            }
        }

        let entry = LedgerEntry {
            file_id: file_id.to_string(),
            fingerprint: fingerprint.to_string(),
            status: LedgerStatus::Committed,
            timestamp: Utc::now(),
            batch_seq: Some(batch_seq),
            reason: None,
        };
        Self::append(&self.path, &entry)?;
        state.in_flight.remove(&key);
        state.entries.insert(key, entry);
        Ok(())
    }

    /// Mark a file abandoned with an operator-visible reason.
    pub fn abandon(
        &self,
        file_id: &str,
        fingerprint: &str,
        reason: &str,
    ) -> Result<(), RowvaultError> {
        let key = (file_id.to_string(), fingerprint.to_string());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let entry = LedgerEntry {
            file_id: file_id.to_string(),
            fingerprint: fingerprint.to_string(),
            status: LedgerStatus::Abandoned,
            timestamp: Utc::now(),
            batch_seq: None,
            reason: Some(reason.to_string()),
        };
        Self::append(&self.path, &entry)?;
        state.in_flight.remove(&key);
        state.entries.insert(key, entry);
        Ok(())
    }

    /// Release a claim without a terminal transition (commit timed out or
    /// the run was cancelled). The `claimed` entry stays in the ledger and
    /// the file is eligible for reprocessing.
    pub fn release(&self, file_id: &str, fingerprint: &str) {
        let key = (file_id.to_string(), fingerprint.to_string());
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight.remove(&key);
    }

    /// True if this exact (file_id, fingerprint) has been committed.
    pub fn is_committed(&self, file_id: &str, fingerprint: &str) -> bool {
        self.status(file_id, fingerprint) == Some(LedgerStatus::Committed)
    }

    /// Current status of a file, if the ledger has seen it.
    pub fn status(&self, file_id: &str, fingerprint: &str) -> Option<LedgerStatus> {
        let key = (file_id.to_string(), fingerprint.to_string());
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.get(&key).map(|e| e.status)
    }

    fn append(path: &Path, entry: &LedgerEntry) -> Result<(), RowvaultError> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(entry)
            .map_err(|e| RowvaultError::Io(std::io::Error::other(e)))?;
        writeln!(file, "{line}")?;
        file.sync_data()?;
        Ok(())
    }
}
