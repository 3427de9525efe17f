//! Records, values, and schemas.
//!
//! A `Record` is one row: an ordered mapping from column name to value.
//! Column order is semantic — the protection policy preserves it (minus
//! dropped columns) and the projections rely on it — so records are backed
//! by an insertion-ordered map rather than a hash map.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single typed field value.
///
/// Serialized untagged, so records round-trip through JSON as plain objects:
/// `null`, numbers, and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent / empty field. Distinct from the empty string.
    Null,
    /// Numeric field (integers are carried as f64, like the source format).
    Num(f64),
    /// Text field.
    Str(String),
}

impl Value {
    /// The value as a string slice, if it is `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// One row; immutable once read from the source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    columns: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self {
            columns: IndexMap::new(),
        }
    }

    /// Append a column. Insertion order is preserved.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.columns.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate columns in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Canonical text form of a numeric value: no trailing `.0` for whole
/// numbers. The integer path is limited to the range where f64 is exact,
/// so the rendering never invents digits.
pub(crate) fn render_num(n: f64) -> String {
    const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0; // 2^53
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_EXACT_INT {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Ordered column names for a batch, taken from the landing file's header
/// row. The landing format declares names only; value types are inferred
/// per cell at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
