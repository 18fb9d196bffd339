//! Storage layer: the Entry Store contract with in-memory and DuckDB backends.

mod error;
mod memory;
pub use error::StoreError;
pub use memory::MemoryEntryStore;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckEntryStore;

use async_trait::async_trait;
use finman_core::{NewRecord, RecordId};

/// Durable storage for resolved entries.
///
/// `insert` is called exactly once per successful resolution; callers never
/// retry an insert that reported success.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn insert(&self, record: &NewRecord) -> Result<RecordId, StoreError>;
}
