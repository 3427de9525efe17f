//! # rowvault
//!
//! Inline column-level protection for append-only tabular ingestion.
//!
//! Untrusted delimited files land in a drop directory; the pipeline admits
//! each file exactly once, applies a per-column protection policy (encrypt,
//! hash, drop, or pass through) during the transform stage, and persists
//! only protected values. Three read projections expose the stored data at
//! different access tiers: protected (stored form), clear (privileged
//! decryption), and masked (general access). Plaintext sensitive values
//! never reach durable storage.
//!
//! ## Public API
//!
//! The public surface of this crate is intentionally narrow. Only the types
//! and functions listed here are intended for use by callers. Everything
//! else is `pub(crate)` at most.

// Module declarations.
pub(crate) mod crypto;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod pipeline;
pub mod policy;
pub mod projection;
pub mod protect;
pub mod quarantine;
pub mod record;
pub mod source;
pub mod store;

pub use error::RowvaultError;
pub use keys::{KeyProvider, KeyVersion, ProtectionKey, StaticKeyProvider};
pub use ledger::{ClaimOutcome, IngestLedger, LedgerStatus};
pub use pipeline::{CycleReport, IngestionPipeline, PipelineConfig};
pub use policy::{ColumnAction, Policy, PolicyConfig};
pub use protect::MaskRule;
pub use record::{Record, Schema, Value};
pub use store::ProtectedStore;

/// Generate a cryptographically secure protection key.
///
/// This is the only entry point for producing key material locally. In
/// production, callers should source keys from a KMS or secret manager
/// behind a [`KeyProvider`] implementation rather than generating them
/// here.
pub fn generate_protection_key() -> Result<ProtectionKey, RowvaultError> {
    let bytes = crypto::generate_random_key()?;
    Ok(ProtectionKey::from_bytes(bytes))
}
