//! SurrealDB-backed HistoryLog implementation
//!
//! Appends are serialized through an async lock so the read of the last
//! sequence number and the insert of the next row happen as one step. The
//! unique `(memory_id, seq)` index rejects anything that slips past it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::HistoryRow;
use crate::storage_traits::{HistoryAction, HistoryEntry, HistoryLog, MemoryId, StorageResult};

/// SurrealDB-backed implementation of [`HistoryLog`].
pub struct SurrealHistoryLog {
    db: Surreal<Any>,
    append_lock: Arc<Mutex<()>>,
}

impl SurrealHistoryLog {
    pub fn new(db: Surreal<Any>) -> Self {
        Self::with_lock(db, Arc::new(Mutex::new(())))
    }

    /// Share an append lock with other ledgers on the same connection.
    pub fn with_lock(db: Surreal<Any>, append_lock: Arc<Mutex<()>>) -> Self {
        Self { db, append_lock }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(crate::StateHandle::setup_db().await?.history_log())
    }

    async fn last_entry(&self, mid: &str) -> StorageResult<Option<HistoryRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM memory_history WHERE memory_id = $mid ORDER BY seq DESC LIMIT 1")
            .bind(("mid", mid.to_string()))
            .await?;

        let rows: Vec<HistoryRow> = res.take(0)?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl HistoryLog for SurrealHistoryLog {
    async fn append(
        &self,
        memory_id: &MemoryId,
        action: HistoryAction,
        payload: &str,
    ) -> StorageResult<HistoryEntry> {
        let _guard = self.append_lock.lock().await;

        let mid = memory_id.as_str();
        let now = Utc::now();
        let (seq, timestamp) = match self.last_entry(mid).await? {
            Some(last) => (last.seq + 1, now.max(last.timestamp)),
            None => (1, now),
        };

        debug!(memory_id = %mid, seq, action = %action, "appending history entry");

        let row = HistoryRow::new(mid.to_string(), seq, action, payload.to_string(), timestamp);
        let created: Option<HistoryRow> = self.db.create("memory_history").content(row).await?;

        created
            .ok_or_else(|| StorageError::Backend(format!("history append returned no row for {mid}")))?
            .into_entry()
    }

    async fn history(&self, memory_id: &MemoryId) -> StorageResult<Vec<HistoryEntry>> {
        let mut res = self
            .db
            .query("SELECT * FROM memory_history WHERE memory_id = $mid ORDER BY seq ASC")
            .bind(("mid", memory_id.as_str().to_string()))
            .await?;

        let rows: Vec<HistoryRow> = res.take(0)?;
        rows.into_iter().map(HistoryRow::into_entry).collect()
    }

    async fn clear(&self) -> StorageResult<()> {
        self.db.query("DELETE memory_history").await?.check()?;
        Ok(())
    }
}
