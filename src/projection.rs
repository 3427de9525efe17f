//! The three read-time projections over the protected store.
//!
//! Pure, non-mutating transforms — no data movement, no caching of
//! plaintext at rest. The query side of the system runs these per record on
//! demand:
//!
//! - **protected**: the stored form, tokens and digests visible.
//! - **clear**: encrypted columns decrypted with the key selected by each
//!   token's embedded version. Privileged access tier.
//! - **masked**: encrypted columns decrypted and partially redacted per the
//!   policy's mask rules. General access tier.
//!
//! Decryption failures are isolated to the field: a corrupt token nulls
//! that field and logs a warning; the row and the batch survive.

use tracing::warn;

use crate::keys::KeyProvider;
use crate::policy::{ColumnAction, Policy};
use crate::protect::{self, MaskRule};
use crate::record::{Record, Value};

/// Mask rule applied to encrypted columns with no configured rule:
/// keep nothing, reveal nothing.
const FULL_REDACTION: MaskRule = MaskRule {
    keep_prefix: 0,
    keep_suffix: 0,
};

/// Suffix appended to encrypted columns' names in the masked projection.
const MASKED_SUFFIX: &str = "_masked";

/// The protected projection: stored columns exactly as committed.
pub fn protected(record: &Record) -> Record {
    record.clone()
}

/// The clear projection: decrypt every `Encrypt`-policy column.
///
/// Hash-policy columns pass through unchanged (irreversible, nothing to
/// decrypt), as do all others. A field that fails to decrypt becomes null
/// and is reported via `tracing::warn` — the row is not aborted.
pub fn clear(record: &Record, policy: &Policy, provider: &dyn KeyProvider) -> Record {
    let mut out = Record::new();
    for (name, value) in record.iter() {
        match policy.action_for(name) {
            ColumnAction::Encrypt => out.push(name, decrypt_value(name, value, provider)),
            _ => out.push(name, value.clone()),
        }
    }
    out
}

/// The masked projection: decrypt-then-mask every `Encrypt`-policy column.
///
/// Masked columns are renamed `<name>_masked` so consumers can never
/// mistake them for the original values. Columns without a configured mask
/// rule fully redact to the marker. Hash-policy and pass-through columns
/// are exposed unchanged.
pub fn masked(record: &Record, policy: &Policy, provider: &dyn KeyProvider) -> Record {
    let mut out = Record::new();
    for (name, value) in record.iter() {
        match policy.action_for(name) {
            ColumnAction::Encrypt => {
                let rule = policy.mask_rule_for(name).copied().unwrap_or(FULL_REDACTION);
                let decrypted = decrypt_value(name, value, provider);
                let masked = protect::mask_field(decrypted.as_str(), &rule);
                out.push(
                    format!("{}{}", name, MASKED_SUFFIX),
                    masked.map_or(Value::Null, Value::Str),
                );
            }
            _ => out.push(name, value.clone()),
        }
    }
    out
}

/// Decrypt one stored field. Null stays null; a non-string stored value or
/// a failing token degrades to null with a warning rather than erroring
/// the row.
fn decrypt_value(column: &str, value: &Value, provider: &dyn KeyProvider) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Str(token) => match protect::decrypt_field(Some(token), provider) {
            Ok(Some(plaintext)) => Value::Str(plaintext),
            Ok(None) => Value::Null,
            Err(err) => {
                warn!(column, %err, "field failed to decrypt, surfacing null");
                Value::Null
            }
        },
        Value::Num(_) => {
            warn!(column, "encrypted column holds a non-token value, surfacing null");
            Value::Null
        }
    }
}
