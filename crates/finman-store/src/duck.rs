//! DuckDB-backed Entry Store.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use arrow::array::Int64Array;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, params};
use finman_core::{IdentityKey, NewRecord, RecordId};
use tracing::info;

use crate::{EntryStore, StoreError};

const SCHEMA: &str = "
CREATE SEQUENCE IF NOT EXISTS record_id_seq START 1;
CREATE TABLE IF NOT EXISTS records (
    id            BIGINT PRIMARY KEY DEFAULT nextval('record_id_seq'),
    identity_key  VARCHAR   NOT NULL,
    price         DOUBLE    NOT NULL,
    name          VARCHAR   NOT NULL,
    category      VARCHAR   NOT NULL,
    is_income     BOOLEAN   NOT NULL,
    occurred_at   TIMESTAMP NOT NULL,
    source_ref    VARCHAR,
    created_at    TIMESTAMP NOT NULL
);";

/// DuckDB store for resolved records, one row per successful resolution.
///
/// Timestamps are stored as UTC `TIMESTAMP`s. Supports both in-memory
/// (ephemeral) and persistent (file-backed) modes: use [`open`](Self::open)
/// for in-memory and [`open_persistent`](Self::open_persistent) for a file
/// that survives across process restarts. Inserts run on Tokio's blocking
/// pool so a slow write never stalls other conversations' turns.
pub struct DuckEntryStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckEntryStore {
    /// Open an in-memory DuckDB database with the records schema in place.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a persistent DuckDB database at the given path.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        lock(&self.conn)
    }

    /// Number of records filed under `identity`.
    pub fn count_for(&self, identity: &IdentityKey) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT count(*)::BIGINT AS cnt FROM records WHERE identity_key = ?")?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([identity.as_str()])?.collect();
        let batch = batches.first().ok_or(StoreError::NoResults)?;
        let col = batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| StoreError::Other("count column not i64".into()))?;
        Ok(col.value(0) as usize)
    }

    /// All records filed under `identity`, newest first.
    pub fn records_for(&self, identity: &IdentityKey) -> Result<Vec<RecordBatch>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, occurred_at, name, category, price, is_income, source_ref, created_at
             FROM records
             WHERE identity_key = ?
             ORDER BY id DESC",
        )?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([identity.as_str()])?.collect();
        Ok(batches)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Unavailable("duckdb connection lock poisoned".into()))
}

fn sql_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn insert_row(conn: &Connection, record: &NewRecord) -> Result<i64, StoreError> {
    let id = conn.query_row(
        "INSERT INTO records
            (identity_key, price, name, category, is_income, occurred_at, source_ref, created_at)
         VALUES (?, ?, ?, ?, ?, ?::TIMESTAMP, ?, ?::TIMESTAMP)
         RETURNING id",
        params![
            record.identity.as_str(),
            record.price,
            record.name.as_str(),
            record.category.as_str(),
            record.is_income,
            sql_timestamp(&record.occurred_at),
            record.source_ref.as_deref(),
            sql_timestamp(&Utc::now()),
        ],
        |row| row.get(0),
    )?;
    Ok(id)
}

#[async_trait]
impl EntryStore for DuckEntryStore {
    async fn insert(&self, record: &NewRecord) -> Result<RecordId, StoreError> {
        let conn = Arc::clone(&self.conn);
        let row = record.clone();
        let id = tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            insert_row(&conn, &row)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("insert task failed: {e}")))??;
        info!(record_id = id, identity = %record.identity, "inserted record");
        Ok(RecordId(id))
    }
}
