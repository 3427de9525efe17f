//! The protected store: durable home of policy-applied records.
//!
//! Append-only, one file per committed batch, holding JSON lines: a
//! manifest first, then the protected records. Batch files are addressed by
//! (file_id, fingerprint), and a write lands via temp-file + atomic rename.
//! Re-writing the same batch after a crash therefore converges on a single
//! logical copy — this is what makes the pipeline's
//! store-write-then-ledger-commit ordering safe to retry.
//!
//! Consumers never read the storage layout directly; they go through the
//! projections in `projection`.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RowvaultError;
use crate::record::Record;

/// Length of the fingerprint prefix used in batch file names. Enough to
/// distinguish replacements of the same file_id; the full fingerprint
/// lives in the manifest.
const FINGERPRINT_PREFIX_LEN: usize = 16;

/// First line of every batch file: which source file the batch derives
/// from, and its position in the commit order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub file_id: String,
    pub fingerprint: String,
    /// Monotonic commit sequence number, unique within this store.
    pub seq: u64,
    pub committed_at: DateTime<Utc>,
    pub records: usize,
}

/// A batch read back from the store.
#[derive(Debug, Clone)]
pub struct CommittedBatch {
    pub manifest: BatchManifest,
    pub records: Vec<Record>,
}

/// Append-only store of protected record batches.
pub struct ProtectedStore {
    dir: PathBuf,
    next_seq: AtomicU64,
}

impl ProtectedStore {
    /// Open a store directory, creating it if absent. The next commit
    /// sequence number resumes after the highest one found on disk.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, RowvaultError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut max_seq = 0u64;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Ok(manifest) = Self::read_manifest(&path) {
                max_seq = max_seq.max(manifest.seq);
            }
        }

        Ok(Self {
            dir,
            next_seq: AtomicU64::new(max_seq + 1),
        })
    }

    /// Durably append one batch for (file_id, fingerprint).
    ///
    /// Idempotent per identity: the batch file name is derived from the
    /// identity, the content is staged in a temp file, and the rename
    /// replaces any earlier write for the same identity. A duplicate append
    /// after a crash-between-write-and-commit leaves exactly one copy.
    pub fn append_batch(
        &self,
        file_id: &str,
        fingerprint: &str,
        records: &[Record],
    ) -> Result<BatchManifest, RowvaultError> {
        let manifest = BatchManifest {
            file_id: file_id.to_string(),
            fingerprint: fingerprint.to_string(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            committed_at: Utc::now(),
            records: records.len(),
        };

        let final_path = self.batch_path(file_id, fingerprint);
        let tmp_path = final_path.with_extension("jsonl.tmp");

        {
            let mut file = fs::File::create(&tmp_path)?;
            writeln!(file, "{}", to_json(&manifest)?)?;
            for record in records {
                writeln!(file, "{}", to_json(record)?)?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &final_path)?;

        Ok(manifest)
    }

    /// True if a batch for this identity is present on disk.
    pub fn has_batch(&self, file_id: &str, fingerprint: &str) -> bool {
        self.batch_path(file_id, fingerprint).exists()
    }

    /// Read every committed batch, ordered by commit sequence.
    pub fn scan(&self) -> Result<Vec<CommittedBatch>, RowvaultError> {
        let mut batches = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            batches.push(Self::read_batch(&path)?);
        }
        batches.sort_by_key(|b| b.manifest.seq);
        Ok(batches)
    }

    /// All protected records across all batches, in commit order.
    pub fn records(&self) -> Result<Vec<Record>, RowvaultError> {
        Ok(self
            .scan()?
            .into_iter()
            .flat_map(|b| b.records)
            .collect())
    }

    fn batch_path(&self, file_id: &str, fingerprint: &str) -> PathBuf {
        let prefix: String = fingerprint.chars().take(FINGERPRINT_PREFIX_LEN).collect();
        self.dir.join(format!("{}-{}.jsonl", sanitize(file_id), prefix))
    }

    fn read_manifest(path: &Path) -> Result<BatchManifest, RowvaultError> {
        let file = fs::File::open(path)?;
        let mut lines = BufReader::new(file).lines();
        let first = lines
            .next()
            .ok_or_else(|| RowvaultError::StructuralParse("empty batch file".into()))??;
        serde_json::from_str(&first)
            .map_err(|e| RowvaultError::StructuralParse(format!("batch manifest: {}", e)))
    }

    fn read_batch(path: &Path) -> Result<CommittedBatch, RowvaultError> {
        let file = fs::File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let first = lines
            .next()
            .ok_or_else(|| RowvaultError::StructuralParse("empty batch file".into()))??;
        let manifest: BatchManifest = serde_json::from_str(&first)
            .map_err(|e| RowvaultError::StructuralParse(format!("batch manifest: {}", e)))?;

        let mut records = Vec::with_capacity(manifest.records);
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line)
                .map_err(|e| RowvaultError::StructuralParse(format!("batch record: {}", e)))?;
            records.push(record);
        }
        Ok(CommittedBatch { manifest, records })
    }
}

/// File names must survive any file_id the landing area throws at us.
fn sanitize(file_id: &str) -> String {
    file_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
            c
        } else {
            '_'
        })
        .collect()
}

fn to_json<T: Serialize>(value: &T) -> Result<String, RowvaultError> {
    serde_json::to_string(value).map_err(|e| RowvaultError::Io(std::io::Error::other(e)))
}
