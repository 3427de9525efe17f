//! Per-field protection operations.
//!
//! Pure, stateless transforms applied to individual field values: encrypt,
//! decrypt, hash, mask. All four are null-preserving — a null field stays
//! null through every transform, and is never confused with the empty
//! string or with the literal string "null".
//!
//! ## Ciphertext token format
//!
//! ```text
//! v1.<key_version>.<base64url-no-pad(nonce || ciphertext || tag)>
//! ```
//!
//! The `v1` prefix is the token-format version and allows a future cipher
//! migration without breaking stored data. `key_version` identifies the key
//! that produced the token, so decryption always selects the correct
//! historical material after rotation. The nonce is fresh per call:
//! encrypting the same plaintext twice yields different tokens.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::crypto;
use crate::error::RowvaultError;
use crate::keys::{KeyProvider, KeyVersion, ProtectionKey};

/// Token-format version prefix.
const TOKEN_PREFIX: &str = "v1";

/// Fixed redaction marker used by `mask_field`.
const REDACTION_MARKER: &str = "***";

/// Encrypt a field value under `key`, tagging the token with `version`.
///
/// Null in, null out. The empty string is a legal plaintext and round-trips
/// exactly.
pub fn encrypt_field(
    value: Option<&str>,
    version: KeyVersion,
    key: &ProtectionKey,
) -> Result<Option<String>, RowvaultError> {
    let Some(plaintext) = value else {
        return Ok(None);
    };
    let sealed = crypto::encrypt(key.as_bytes(), plaintext.as_bytes())?;
    Ok(Some(format!(
        "{}.{}.{}",
        TOKEN_PREFIX,
        version,
        URL_SAFE_NO_PAD.encode(sealed)
    )))
}

/// Decrypt a ciphertext token produced by `encrypt_field`.
///
/// The key version embedded in the token selects the material to use, so
/// tokens written before a rotation stay readable. Fails with
/// `MalformedToken` if the token structure is wrong, `KeyNotFound` if the
/// embedded version is unknown, and `DecryptionFailure` if the
/// authentication tag does not verify — never partial plaintext.
pub fn decrypt_field(
    token: Option<&str>,
    provider: &dyn KeyProvider,
) -> Result<Option<String>, RowvaultError> {
    let Some(token) = token else {
        return Ok(None);
    };

    let (version, payload) = parse_token(token)?;
    let key = provider.material(version)?;
    let plaintext = crypto::decrypt(key.as_bytes(), &payload)?;
    String::from_utf8(plaintext).map(Some).map_err(|_| RowvaultError::DecryptionFailure)
}

/// Split a token into its embedded key version and raw sealed bytes.
fn parse_token(token: &str) -> Result<(KeyVersion, Vec<u8>), RowvaultError> {
    let mut parts = token.splitn(3, '.');
    let prefix = parts.next().ok_or(RowvaultError::MalformedToken)?;
    let version = parts.next().ok_or(RowvaultError::MalformedToken)?;
    let payload = parts.next().ok_or(RowvaultError::MalformedToken)?;

    if prefix != TOKEN_PREFIX {
        return Err(RowvaultError::MalformedToken);
    }
    let version: KeyVersion = version.parse().map_err(|_| RowvaultError::MalformedToken)?;
    let sealed = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| RowvaultError::MalformedToken)?;
    Ok((version, sealed))
}

/// Irreversible digest of a field value: SHA-256, lowercase hex, 64 chars.
///
/// Deterministic and keyless — hashed columns exist for equality joins and
/// dedup, not for secrecy of a key. Null in, null out.
pub fn hash_field(value: Option<&str>) -> Option<String> {
    value.map(|v| crypto::sha256_hex(v.as_bytes()))
}

/// How much of a decrypted value the masked projection may reveal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MaskRule {
    /// Leading characters to keep.
    pub keep_prefix: usize,
    /// Trailing characters to keep.
    pub keep_suffix: usize,
}

impl MaskRule {
    pub fn prefix(keep: usize) -> Self {
        Self {
            keep_prefix: keep,
            keep_suffix: 0,
        }
    }

    pub fn suffix(keep: usize) -> Self {
        Self {
            keep_prefix: 0,
            keep_suffix: keep,
        }
    }
}

/// Partially redact a decrypted value for general-access display.
///
/// Keeps the first `keep_prefix` and last `keep_suffix` characters and
/// replaces the middle with a fixed `***` marker. Counting is by character,
/// not byte, so multibyte input never splits. Keeps clamp to the available
/// length; the marker is always present, so masked output is never
/// identical in shape to the plaintext. Null in, null out.
pub fn mask_field(value: Option<&str>, rule: &MaskRule) -> Option<String> {
    let value = value?;
    let chars: Vec<char> = value.chars().collect();
    let total = chars.len();

    let keep_prefix = rule.keep_prefix.min(total);
    let keep_suffix = rule.keep_suffix.min(total - keep_prefix);

    let mut masked = String::with_capacity(value.len() + REDACTION_MARKER.len());
    masked.extend(&chars[..keep_prefix]);
    masked.push_str(REDACTION_MARKER);
    masked.extend(&chars[total - keep_suffix..]);
    Some(masked)
}
