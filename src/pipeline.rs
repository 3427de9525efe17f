//! The ingestion pipeline: discovery, claim, read, transform, commit.
//!
//! One discovery cycle walks the landing area and runs each unclaimed file
//! through the phases below. Phases within a file are strictly sequential;
//! files are independent, and one bad file never blocks the rest of the
//! cycle.
//!
//! ```text
//! Discovering -> (per file) Reading -> Transforming -> Committing
//! ```
//!
//! The correctness spine is the ordering invariant in `commit_file`: the
//! protected-store write happens before the ledger commit. A crash between
//! the two leaves the file `claimed`; the next cycle re-claims it and
//! re-writes the batch, and because store writes are identity-addressed the
//! duplicate converges to a single logical copy.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::RowvaultError;
use crate::keys::KeyProvider;
use crate::ledger::{ClaimOutcome, IngestLedger};
use crate::policy::Policy;
use crate::quarantine::QuarantineSink;
use crate::source::{self, SourceFile};
use crate::store::ProtectedStore;

/// Phase of the per-cycle state machine. Used for reporting and tracing;
/// transitions are driven by `run_cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Discovering,
    Reading,
    Transforming,
    Committing,
    Done,
}

/// Tunables for a pipeline instance.
pub struct PipelineConfig {
    /// Directory external collaborators drop files into.
    pub landing_dir: PathBuf,
    /// Field delimiter for landing files.
    pub delimiter: char,
    /// Deadline for the store-write + ledger-commit of one file. On expiry
    /// the file stays claimed and is retried next cycle.
    pub commit_timeout: Duration,
}

impl PipelineConfig {
    pub fn new(landing_dir: impl Into<PathBuf>) -> Self {
        Self {
            landing_dir: landing_dir.into(),
            delimiter: source::DEFAULT_DELIMITER,
            commit_timeout: Duration::from_secs(30),
        }
    }
}

/// What one discovery cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Files discovered in the landing area.
    pub discovered: usize,
    /// Files committed this cycle.
    pub committed: usize,
    /// Files skipped: already committed, abandoned earlier, or claimed by
    /// a concurrent instance.
    pub skipped: usize,
    /// Files abandoned this cycle (structural parse failure).
    pub abandoned: usize,
    /// Files left claimed for retry (commit timeout).
    pub retried: usize,
    /// Individual rows quarantined across all files this cycle.
    pub quarantined_rows: usize,
}

/// Continuously running (or single-pass) ingestion orchestrator.
///
/// Multiple instances may run against the same ledger and store; the
/// ledger's atomic claim keeps them from double-processing a file.
pub struct IngestionPipeline {
    config: PipelineConfig,
    policy: Policy,
    provider: Arc<dyn KeyProvider>,
    ledger: Arc<IngestLedger>,
    store: Arc<ProtectedStore>,
    quarantine: Mutex<Box<dyn QuarantineSink>>,
}

impl IngestionPipeline {
    pub fn new(
        config: PipelineConfig,
        policy: Policy,
        provider: Arc<dyn KeyProvider>,
        ledger: Arc<IngestLedger>,
        store: Arc<ProtectedStore>,
        quarantine: Box<dyn QuarantineSink>,
    ) -> Self {
        Self {
            config,
            policy,
            provider,
            ledger,
            store,
            quarantine: Mutex::new(quarantine),
        }
    }

    /// Run one discovery cycle (batch mode).
    ///
    /// The active key is fetched once here and reused for every file in
    /// the cycle, so rotation takes effect at cycle boundaries without a
    /// restart.
    pub fn run_cycle(&self) -> Result<CycleReport, RowvaultError> {
        let mut report = CycleReport::default();

        debug!(state = ?CycleState::Discovering, "cycle start");
        let candidates = source::discover(&self.config.landing_dir)?;
        report.discovered = candidates.len();

        for file in &candidates {
            if self.ledger.is_committed(&file.file_id, &file.fingerprint) {
                report.skipped += 1;
                continue;
            }
            match self.ledger.claim(&file.file_id, &file.fingerprint)? {
                ClaimOutcome::Claimed => {}
                ClaimOutcome::AlreadyCommitted | ClaimOutcome::Abandoned => {
                    report.skipped += 1;
                    continue;
                }
                ClaimOutcome::Conflict => {
                    debug!(file_id = %file.file_id, "claimed by another instance, skipping");
                    report.skipped += 1;
                    continue;
                }
            }

            self.process_claimed(file, &mut report);
        }

        debug!(state = ?CycleState::Done, ?report, "cycle end");
        Ok(report)
    }

    /// Run discovery cycles until `stop` is set (continuous mode).
    ///
    /// The stop flag is honored between cycles and between files — never
    /// mid-commit, so cancellation cannot leave a partially committed file.
    /// A failed cycle (e.g. the landing area is briefly unreachable) is
    /// logged and retried at the next poll; it does not end the loop.
    pub fn run(&self, poll_interval: Duration, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            match self.run_cycle() {
                Ok(report) => {
                    if report.committed > 0 || report.abandoned > 0 {
                        info!(?report, "ingestion cycle complete");
                    }
                }
                Err(err) => {
                    warn!(%err, "ingestion cycle failed, retrying at next poll");
                }
            }
            if stop.load(Ordering::Relaxed) {
                break;
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Read, transform, and commit one claimed file, folding the outcome
    /// into the cycle report. Failures here are isolated per file.
    fn process_claimed(&self, file: &SourceFile, report: &mut CycleReport) {
        debug!(state = ?CycleState::Reading, file_id = %file.file_id, "processing file");

        let parsed = {
            let mut sink = self.quarantine.lock().unwrap_or_else(|e| e.into_inner());
            source::read_batch(file, self.config.delimiter, sink.as_mut())
        };
        let parsed = match parsed {
            Ok(parsed) => parsed,
            Err(RowvaultError::StructuralParse(reason)) => {
                warn!(file_id = %file.file_id, %reason, "abandoning file");
                if let Err(err) = self.ledger.abandon(&file.file_id, &file.fingerprint, &reason) {
                    warn!(file_id = %file.file_id, %err, "failed to record abandonment");
                }
                report.abandoned += 1;
                return;
            }
            Err(err) => {
                // Transient (I/O): release the claim and retry next cycle.
                warn!(file_id = %file.file_id, %err, "read failed, releasing claim");
                self.ledger.release(&file.file_id, &file.fingerprint);
                report.retried += 1;
                return;
            }
        };
        report.quarantined_rows += parsed.quarantined;

        debug!(state = ?CycleState::Transforming, file_id = %file.file_id, rows = parsed.records.len(), "applying policy");
        let protected = match self
            .provider
            .active()
            .and_then(|(version, key)| self.policy.apply(&parsed.records, version, &key))
        {
            Ok(protected) => protected,
            Err(err) => {
                warn!(file_id = %file.file_id, %err, "transform failed, releasing claim");
                self.ledger.release(&file.file_id, &file.fingerprint);
                report.retried += 1;
                return;
            }
        };

        debug!(state = ?CycleState::Committing, file_id = %file.file_id, "committing");
        match self.commit_file(file, &protected) {
            Ok(seq) => {
                info!(file_id = %file.file_id, seq, rows = protected.len(), "file committed");
                report.committed += 1;
            }
            Err(RowvaultError::CommitTimeout(_)) => {
                warn!(file_id = %file.file_id, "commit timed out, will retry");
                self.ledger.release(&file.file_id, &file.fingerprint);
                report.retried += 1;
            }
            Err(err) => {
                warn!(file_id = %file.file_id, %err, "commit failed, releasing claim");
                self.ledger.release(&file.file_id, &file.fingerprint);
                report.retried += 1;
            }
        }
    }

    /// Atomic commit of one file: store write happens-before ledger commit.
    fn commit_file(
        &self,
        file: &SourceFile,
        protected: &[crate::record::Record],
    ) -> Result<u64, RowvaultError> {
        let started = Instant::now();

        let manifest = self
            .store
            .append_batch(&file.file_id, &file.fingerprint, protected)?;

        if started.elapsed() > self.config.commit_timeout {
            // The batch file may have landed, but the ledger entry stays
            // claimed; the identity-addressed store makes the retry safe.
            return Err(RowvaultError::CommitTimeout(file.file_id.clone()));
        }

        self.ledger
            .commit(&file.file_id, &file.fingerprint, manifest.seq)?;
        Ok(manifest.seq)
    }
}
