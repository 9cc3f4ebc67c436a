//! Replicated record snapshot

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Column holding the globally unique record identity
pub const ID_COLUMN: &str = "id";
/// Creation timestamp column (Unix ms)
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Last update timestamp column (Unix ms), monotonically non-decreasing
pub const UPDATED_AT_COLUMN: &str = "updated_at";
/// Tombstone timestamp column (Unix ms), `NULL` while the record is live
pub const DELETED_AT_COLUMN: &str = "deleted_at";

/// A row of any registered entity, keyed by column name.
///
/// The engine only interprets the identity and timestamp columns; all other
/// columns are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

/// The timestamps the conflict resolver compares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordVersion {
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl RecordVersion {
    /// Last modification time: `updated_at`, falling back to `created_at`.
    pub fn last_modified(&self) -> i64 {
        self.updated_at.or(self.created_at).unwrap_or(0)
    }

    pub const fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Record {
    /// Build a record from a JSON object. Requires a non-empty string `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(Error::InvalidRecord(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }

    /// Build a record from a column map. Requires a non-empty string `id`.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        let record = Self(map);
        if record.id().is_none() {
            return Err(Error::InvalidRecord(
                "record is missing a string 'id'".to_string(),
            ));
        }
        Ok(record)
    }

    /// Record identity, stable across stores.
    pub fn id(&self) -> Option<&str> {
        self.0
            .get(ID_COLUMN)
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
    }

    pub fn created_at(&self) -> Option<i64> {
        self.timestamp(CREATED_AT_COLUMN)
    }

    pub fn updated_at(&self) -> Option<i64> {
        self.timestamp(UPDATED_AT_COLUMN)
    }

    pub fn deleted_at(&self) -> Option<i64> {
        self.timestamp(DELETED_AT_COLUMN)
    }

    pub fn is_tombstone(&self) -> bool {
        self.deleted_at().is_some()
    }

    pub fn version(&self) -> RecordVersion {
        RecordVersion {
            created_at: self.created_at(),
            updated_at: self.updated_at(),
            deleted_at: self.deleted_at(),
        }
    }

    /// Get a column value
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Set a column value
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    /// Builder-style variant of [`Record::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Mark this record deleted at `deleted_at`, keeping `updated_at` monotonic.
    ///
    /// An existing tombstone keeps its original timestamp.
    #[must_use]
    pub fn into_tombstone(mut self, deleted_at: i64) -> Self {
        if self.is_tombstone() {
            return self;
        }
        let updated_at = self.updated_at().map_or(deleted_at, |at| at.max(deleted_at));
        self.set(DELETED_AT_COLUMN, deleted_at);
        self.set(UPDATED_AT_COLUMN, updated_at);
        self
    }

    /// Underlying column map
    pub const fn columns(&self) -> &Map<String, Value> {
        &self.0
    }

    #[allow(clippy::cast_possible_truncation)]
    fn timestamp(&self, column: &str) -> Option<i64> {
        match self.0.get(column)? {
            Value::Number(number) => number
                .as_i64()
                // Whole-number reals come back from some drivers as floats
                .or_else(|| number.as_f64().map(|value| value as i64)),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}
