//! Types crossing the Entry Store boundary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::{Category, Entry};

/// Canonical phone an authenticated conversation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Build from a raw phone; `None` when it does not normalise.
    pub fn from_phone(raw: &str) -> Option<Self> {
        crate::phone::normalize_phone(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned id of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully resolved entry ready for a single insert.
///
/// Only constructed from an [`Entry`] that has a price, so every stored
/// record carries an amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub identity: IdentityKey,
    pub name: String,
    pub category: Category,
    pub price: f64,
    pub is_income: bool,
    pub occurred_at: DateTime<Utc>,
    /// Opaque reference to the chat-side identity that submitted the entry.
    pub source_ref: Option<String>,
}

impl NewRecord {
    /// `None` when the entry has no price.
    pub fn from_entry(
        identity: IdentityKey,
        entry: &Entry,
        occurred_at: DateTime<Utc>,
        source_ref: Option<String>,
    ) -> Option<Self> {
        Some(Self {
            identity,
            name: entry.display_name().to_string(),
            category: entry.category,
            price: entry.price?,
            is_income: entry.is_income,
            occurred_at,
            source_ref,
        })
    }
}

/// A row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub record: NewRecord,
    pub created_at: DateTime<Utc>,
}
