//! Error types for rowvault.
//!
//! Every variant is a distinct failure mode in the protection pipeline.
//! Messages are intentionally minimal — they signal *what* failed without
//! echoing plaintext or key material back to the caller.

use std::fmt;

/// The single error type for all rowvault operations.
#[derive(Debug)]
pub enum RowvaultError {
    /// A cryptographic key was invalid (wrong length, malformed, etc.).
    InvalidKey,

    /// Encryption failed. The underlying `ring` operation returned an error.
    EncryptionFailure,

    /// Decryption failed: wrong key, tampered ciphertext, or a corrupted
    /// GCM authentication tag. No partial plaintext is ever returned.
    DecryptionFailure,

    /// A ciphertext token did not have the expected structure
    /// (`v1.<key_version>.<payload>`).
    MalformedToken,

    /// No key material is registered for the given key version.
    KeyNotFound(u32),

    /// The system's random number generator failed to produce bytes.
    RandomnessFailure,

    /// A column name appears in more than one policy action set.
    /// Fatal at startup; the pipeline refuses to run.
    OverlappingPolicy(String),

    /// A source file could not be parsed at all (empty, undecodable,
    /// missing header). The whole file is abandoned, never retried.
    StructuralParse(String),

    /// Committing a file exceeded the configured deadline. The ledger entry
    /// stays `claimed`; retrying the whole file is safe.
    CommitTimeout(String),

    /// An I/O error from the ledger, store, or landing area.
    Io(std::io::Error),
}

impl fmt::Display for RowvaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key"),
            Self::EncryptionFailure => write!(f, "encryption failed"),
            Self::DecryptionFailure => write!(f, "decryption failed"),
            Self::MalformedToken => write!(f, "malformed ciphertext token"),
            Self::KeyNotFound(version) => write!(f, "no key for version {}", version),
            Self::RandomnessFailure => write!(f, "randomness source failed"),
            Self::OverlappingPolicy(col) => {
                write!(f, "column assigned to more than one policy action: {}", col)
            }
            Self::StructuralParse(reason) => write!(f, "structural parse failure: {}", reason),
            Self::CommitTimeout(file_id) => write!(f, "commit timed out for file: {}", file_id),
            Self::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for RowvaultError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RowvaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
