//! Process-local Entry Store.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use finman_core::{IdentityKey, NewRecord, RecordId, StoredRecord};
use tracing::info;

use crate::{EntryStore, StoreError};

/// Entry Store kept in memory; ids start at 1 and increase by one per insert.
#[derive(Default)]
pub struct MemoryEntryStore {
    records: Mutex<Vec<StoredRecord>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all identities.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records filed under `identity`, newest first.
    pub fn records_for(&self, identity: &IdentityKey) -> Vec<StoredRecord> {
        let Ok(records) = self.records.lock() else {
            return Vec::new();
        };
        records
            .iter()
            .rev()
            .filter(|r| &r.record.identity == identity)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn insert(&self, record: &NewRecord) -> Result<RecordId, StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("record list lock poisoned".into()))?;
        let id = RecordId(records.len() as i64 + 1);
        records.push(StoredRecord {
            id,
            record: record.clone(),
            created_at: Utc::now(),
        });
        info!(record_id = %id, identity = %record.identity, "stored record");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finman_core::Category;

    fn record(phone: &str, name: &str, price: f64) -> NewRecord {
        NewRecord {
            identity: IdentityKey::from_phone(phone).unwrap(),
            name: name.into(),
            category: Category::Food,
            price,
            is_income: false,
            occurred_at: Utc::now(),
            source_ref: None,
        }
    }

    #[tokio::test]
    async fn ids_are_sequential() {
        let store = MemoryEntryStore::new();
        assert!(store.is_empty());
        let a = store.insert(&record("9699585045", "Tea", 10.0)).await.unwrap();
        let b = store.insert(&record("9699585045", "Bus", 25.0)).await.unwrap();
        assert_eq!(a, RecordId(1));
        assert_eq!(b, RecordId(2));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn records_are_scoped_by_identity_newest_first() {
        let store = MemoryEntryStore::new();
        store.insert(&record("9699585045", "Tea", 10.0)).await.unwrap();
        store.insert(&record("9000000001", "Movie", 200.0)).await.unwrap();
        store.insert(&record("9699585045", "Bus", 25.0)).await.unwrap();

        let mine = store.records_for(&IdentityKey::from_phone("9699585045").unwrap());
        let names: Vec<&str> = mine.iter().map(|r| r.record.name.as_str()).collect();
        assert_eq!(names, vec!["Bus", "Tea"]);
    }
}
