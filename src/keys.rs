//! Key material ownership and the key-provider boundary.
//!
//! This module owns two responsibilities:
//! 1. Holding key material in a type that is opaque, non-cloneable, and
//!    zeroised on drop.
//! 2. Defining the `KeyProvider` boundary through which the pipeline and the
//!    projections obtain keys — there is no ambient or global key anywhere
//!    in the crate.
//!
//! This is one of exactly two modules permitted to import `ring` directly
//! (the other is `crypto`), and here only transitively through
//! `crypto::KEY_LEN`.
//!
//! ## Versioning
//!
//! Every key carries a `KeyVersion`. Ciphertext tokens embed the version of
//! the key that produced them, so decryption always selects the correct
//! historical key. Rotation registers new material under a new version and
//! makes it active; old versions stay addressable for as long as old
//! ciphertext must remain readable.

use std::collections::HashMap;
use std::sync::RwLock;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::KEY_LEN;
use crate::error::RowvaultError;

/// Identifies which key material produced a ciphertext token.
pub type KeyVersion = u32;

/// A symmetric protection key.
///
/// - Not `Clone`. Cannot be duplicated without explicit conversion.
/// - Zeroised on drop. Memory is overwritten before deallocation.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ProtectionKey {
    bytes: [u8; KEY_LEN],
}

impl ProtectionKey {
    /// Construct a `ProtectionKey` from raw bytes.
    ///
    /// In production, the caller should source these bytes from a KMS or
    /// secret manager behind a `KeyProvider` implementation. For tests, use
    /// fixed bytes or `crate::generate_protection_key()`.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Borrow the raw key bytes for use in encrypt/decrypt operations.
    ///
    /// `pub(crate)` — raw bytes never leave the crate.
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for ProtectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key bytes.
        f.write_str("ProtectionKey([redacted])")
    }
}

/// Source of key material for the pipeline and the read projections.
///
/// Implementations must be shareable across concurrent pipeline instances.
/// The pipeline fetches the active key once per discovery cycle and reuses
/// it for the whole batch, so `active` is not on any per-record hot path.
pub trait KeyProvider: Send + Sync {
    /// The key new ciphertext should be written under.
    fn active(&self) -> Result<(KeyVersion, ProtectionKey), RowvaultError>;

    /// Material for a specific historical version, used at decrypt time.
    /// Fails with `KeyNotFound` if the version was never registered or has
    /// been retired.
    fn material(&self, version: KeyVersion) -> Result<ProtectionKey, RowvaultError>;
}

/// An in-memory `KeyProvider` holding one or more key versions.
///
/// Supports hot-swap rotation: `rotate` registers new material and makes it
/// active without restarting the pipeline. Commits that began under the old
/// version finish under it; the next discovery cycle picks up the new one.
pub struct StaticKeyProvider {
    inner: RwLock<ProviderState>,
}

struct ProviderState {
    active: KeyVersion,
    keys: HashMap<KeyVersion, [u8; KEY_LEN]>,
}

impl Drop for ProviderState {
    fn drop(&mut self) {
        for bytes in self.keys.values_mut() {
            bytes.zeroize();
        }
    }
}

impl StaticKeyProvider {
    /// Create a provider with a single key registered as version 1.
    pub fn new(key: ProtectionKey) -> Self {
        let mut keys = HashMap::new();
        keys.insert(1, *key.as_bytes());
        Self {
            inner: RwLock::new(ProviderState { active: 1, keys }),
        }
    }

    /// Register `key` under `version` and make it the active key.
    ///
    /// Previously registered versions remain addressable so that old
    /// ciphertext stays readable.
    pub fn rotate(&self, version: KeyVersion, key: ProtectionKey) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.keys.insert(version, *key.as_bytes());
        state.active = version;
    }

    /// The currently active version.
    pub fn active_version(&self) -> KeyVersion {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).active
    }
}

impl KeyProvider for StaticKeyProvider {
    fn active(&self) -> Result<(KeyVersion, ProtectionKey), RowvaultError> {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let bytes = state
            .keys
            .get(&state.active)
            .ok_or(RowvaultError::KeyNotFound(state.active))?;
        Ok((state.active, ProtectionKey::from_bytes(*bytes)))
    }

    fn material(&self, version: KeyVersion) -> Result<ProtectionKey, RowvaultError> {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let bytes = state
            .keys
            .get(&version)
            .ok_or(RowvaultError::KeyNotFound(version))?;
        Ok(ProtectionKey::from_bytes(*bytes))
    }
}
