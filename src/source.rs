//! Landing-area discovery and source file parsing.
//!
//! The landing area is a directory that external collaborators drop
//! delimited text files into. Discovery lists candidate files and
//! fingerprints their content; parsing turns a file into a batch of
//! records against the header schema, quarantining malformed rows
//! individually and failing structurally only when the file as a whole is
//! unusable (empty, not UTF-8, header missing).

use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto;
use crate::error::RowvaultError;
use crate::quarantine::{QuarantineRecord, QuarantineSink};
use crate::record::{Record, Schema, Value};

/// Default field delimiter for landing files.
pub const DEFAULT_DELIMITER: char = ',';

/// A candidate file discovered in the landing area.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Logical identity: the file name within the landing area.
    pub file_id: String,
    /// SHA-256 hex of the file content. A replaced file gets a new
    /// fingerprint and is treated as a new logical file.
    pub fingerprint: String,
    pub path: PathBuf,
}

/// A parsed batch: the header schema and the surviving records.
#[derive(Debug)]
pub struct ParsedBatch {
    pub schema: Schema,
    pub records: Vec<Record>,
    /// Rows excluded by the parser (also sent to the quarantine sink).
    pub quarantined: usize,
}

/// List the files currently sitting in the landing area, fingerprinted.
///
/// Returns them in name order for deterministic cycles. Subdirectories are
/// ignored — the landing area is flat by contract.
pub fn discover(landing_dir: &Path) -> Result<Vec<SourceFile>, RowvaultError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(landing_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_id = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let content = fs::read(&path)?;
        files.push(SourceFile {
            file_id,
            fingerprint: crypto::sha256_hex(&content),
            path,
        });
    }
    files.sort_by(|a, b| a.file_id.cmp(&b.file_id));
    Ok(files)
}

/// Parse a landing file into records.
///
/// The first line is the header and declares the column names. Each
/// subsequent line must have exactly as many fields as the header; rows
/// that don't are quarantined with a reason and excluded. Empty fields
/// parse as null, purely numeric fields as numbers, everything else as
/// text.
pub fn read_batch(
    source: &SourceFile,
    delimiter: char,
    quarantine: &mut dyn QuarantineSink,
) -> Result<ParsedBatch, RowvaultError> {
    let bytes = fs::read(&source.path)?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|_| RowvaultError::StructuralParse("file is not valid UTF-8".into()))?;

    let mut lines = text.lines();
    let header = lines
        .next()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| RowvaultError::StructuralParse("missing header row".into()))?;

    let columns: Vec<String> = header.split(delimiter).map(|c| c.trim().to_string()).collect();
    if columns.iter().any(|c| c.is_empty()) {
        return Err(RowvaultError::StructuralParse("header has an empty column name".into()));
    }
    let schema = Schema::new(columns);

    let mut records = Vec::new();
    let mut quarantined = 0usize;
    for (idx, line) in lines.enumerate() {
        // Header is line 1; data starts at line 2.
        let line_no = idx + 2;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != schema.len() {
            quarantine.record(QuarantineRecord::new(
                &source.file_id,
                line_no,
                format!("expected {} fields, got {}", schema.len(), fields.len()),
            ));
            quarantined += 1;
            continue;
        }

        let record = schema
            .columns()
            .iter()
            .zip(fields)
            .map(|(name, raw)| (name.clone(), parse_value(raw)))
            .collect();
        records.push(record);
    }

    Ok(ParsedBatch {
        schema,
        records,
        quarantined,
    })
}

/// Infer a field's value from its text. Mirrors the source format's
/// type inference: empty means null, a clean number is numeric, anything
/// else is text.
///
/// A field is only numeric if its text survives the round-trip through
/// f64: digit strings too long to represent exactly, leading zeros, and
/// trailing decimal zeros all stay text, so identifiers hash and encrypt
/// as written.
fn parse_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        // Reject exotic float spellings the source format would keep as text.
        let plain = trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+');
        if plain && crate::record::render_num(n) == trimmed {
            return Value::Num(n);
        }
    }
    Value::Str(trimmed.to_string())
}
