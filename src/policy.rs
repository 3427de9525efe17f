//! Column-level protection policy.
//!
//! A policy maps column names to one of four actions: encrypt, hash, drop,
//! or pass through. The mapping is declared as three column-name sets plus
//! per-column mask rules, validated once at startup, and never re-derived
//! per batch. A column name in more than one set is a configuration error,
//! rejected before any record is processed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RowvaultError;
use crate::keys::{KeyVersion, ProtectionKey};
use crate::protect::{self, MaskRule};
use crate::record::{Record, Value};

/// What happens to a column during the transform stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnAction {
    /// Reversible authenticated encryption; readable via the clear and
    /// masked projections.
    Encrypt,
    /// Irreversible SHA-256 digest; usable for equality joins and dedup.
    Hash,
    /// The column never reaches durable storage.
    Drop,
    /// Stored verbatim.
    PassThrough,
}

/// The declarative policy surface, as configured by the operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Columns protected with reversible encryption.
    pub encrypt: Vec<String>,
    /// Columns replaced by an irreversible digest.
    pub hash: Vec<String>,
    /// Columns removed entirely.
    pub drop: Vec<String>,
    /// Per-column display rules for the masked projection. Encrypted
    /// columns without a rule here fully redact.
    pub mask_rules: HashMap<String, MaskRule>,
}

/// A validated policy. Built once at startup; immutable afterwards.
#[derive(Debug, Clone)]
pub struct Policy {
    actions: HashMap<String, ColumnAction>,
    mask_rules: HashMap<String, MaskRule>,
}

impl Policy {
    /// Validate a policy configuration.
    ///
    /// Rejects with `OverlappingPolicy` if any column name appears in more
    /// than one of the three action sets. Columns named here but absent
    /// from a given record are not an error — they simply have no effect,
    /// which tolerates schema drift in both directions.
    pub fn validate(config: PolicyConfig) -> Result<Self, RowvaultError> {
        let mut actions: HashMap<String, ColumnAction> = HashMap::new();

        let sets = [
            (ColumnAction::Encrypt, &config.encrypt),
            (ColumnAction::Hash, &config.hash),
            (ColumnAction::Drop, &config.drop),
        ];
        for (action, columns) in sets {
            for name in columns {
                if actions.insert(name.clone(), action).is_some() {
                    return Err(RowvaultError::OverlappingPolicy(name.clone()));
                }
            }
        }

        Ok(Self {
            actions,
            mask_rules: config.mask_rules,
        })
    }

    /// The action assigned to a column. Unlisted columns pass through.
    pub fn action_for(&self, column: &str) -> ColumnAction {
        self.actions
            .get(column)
            .copied()
            .unwrap_or(ColumnAction::PassThrough)
    }

    /// The mask rule for a column, if one is configured.
    pub fn mask_rule_for(&self, column: &str) -> Option<&MaskRule> {
        self.mask_rules.get(column)
    }

    /// Columns assigned the given action, in arbitrary order.
    pub fn columns_with(&self, action: ColumnAction) -> impl Iterator<Item = &str> {
        self.actions
            .iter()
            .filter(move |(_, a)| **a == action)
            .map(|(name, _)| name.as_str())
    }

    /// Apply the policy to one record.
    ///
    /// Column order is preserved, minus dropped columns. Null values stay
    /// null under every action. Processing is per-record independent — no
    /// cross-record state — so callers may batch arbitrarily.
    pub fn apply_record(
        &self,
        record: &Record,
        version: KeyVersion,
        key: &ProtectionKey,
    ) -> Result<Record, RowvaultError> {
        let mut protected = Record::new();
        for (name, value) in record.iter() {
            match self.action_for(name) {
                ColumnAction::Drop => continue,
                ColumnAction::PassThrough => protected.push(name, value.clone()),
                ColumnAction::Encrypt => {
                    let token = protect::encrypt_field(field_text(value).as_deref(), version, key)?;
                    protected.push(name, token.map_or(Value::Null, Value::Str));
                }
                ColumnAction::Hash => {
                    let digest = protect::hash_field(field_text(value).as_deref());
                    protected.push(name, digest.map_or(Value::Null, Value::Str));
                }
            }
        }
        Ok(protected)
    }

    /// Apply the policy to a batch of records.
    pub fn apply(
        &self,
        batch: &[Record],
        version: KeyVersion,
        key: &ProtectionKey,
    ) -> Result<Vec<Record>, RowvaultError> {
        batch
            .iter()
            .map(|record| self.apply_record(record, version, key))
            .collect()
    }
}

/// Text form of a value for encryption or hashing. Numerics are protected
/// as their canonical decimal rendering, which matches their source text
/// because the parser only admits numbers that round-trip; nulls stay null.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Str(s) => Some(s.clone()),
        Value::Num(n) => Some(crate::record::render_num(*n)),
    }
}
