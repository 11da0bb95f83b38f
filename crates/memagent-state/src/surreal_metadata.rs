//! SurrealDB-backed MetadataStore implementation
//!
//! Rows live at `memory_metadata:<memory_id>`; every mutation is a single
//! `UPSERT` statement. The embedded engines do not isolate concurrent
//! upserts of one row, so writes to an id are also serialized through a
//! [`KeyedLocks`] shared by every store handed out by one `StateHandle`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::debug;

use crate::error::StorageError;
use crate::locks::KeyedLocks;
use crate::schema::MetadataRow;
use crate::storage_traits::{MemoryId, MetadataEntry, MetadataStore, StorageResult};

const SET_IMPORTANCE: &str = "\
    UPSERT type::thing('memory_metadata', $mid) SET \
        memory_id = $mid, \
        importance = $importance, \
        access_count = access_count ?? 1, \
        last_accessed_at = last_accessed_at ?? $now \
    RETURN AFTER";

const BUMP_ACCESS: &str = "\
    UPSERT type::thing('memory_metadata', $mid) SET \
        memory_id = $mid, \
        importance = importance ?? 0.0, \
        access_count = (access_count ?? 0) + 1, \
        last_accessed_at = IF last_accessed_at > $now THEN last_accessed_at ELSE $now END \
    RETURN AFTER";

const MAX_ATTEMPTS: u32 = 16;

fn is_retryable(err: &surrealdb::Error) -> bool {
    let msg = err.to_string();
    msg.contains("can be retried") || msg.contains("conflict")
}

/// SurrealDB-backed implementation of [`MetadataStore`].
pub struct SurrealMetadataStore {
    db: Surreal<Any>,
    write_locks: Arc<KeyedLocks>,
}

impl SurrealMetadataStore {
    pub fn new(db: Surreal<Any>) -> Self {
        Self::with_locks(db, Arc::new(KeyedLocks::new()))
    }

    /// Share per-id write locks with other stores on the same connection.
    pub fn with_locks(db: Surreal<Any>, write_locks: Arc<KeyedLocks>) -> Self {
        Self { db, write_locks }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(crate::StateHandle::setup_db().await?.metadata_store())
    }

    /// Run one upsert, retrying when the engine reports a write conflict.
    async fn upsert(
        &self,
        sql: &'static str,
        id: &MemoryId,
        importance: Option<f64>,
    ) -> StorageResult<MetadataEntry> {
        let _guard = self.write_locks.lock(id.as_str()).await;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut query = self
                .db
                .query(sql)
                .bind(("mid", id.as_str().to_string()))
                .bind(("now", SurrealDatetime::from(Utc::now())));
            if let Some(importance) = importance {
                query = query.bind(("importance", importance));
            }

            let result = match query.await {
                Ok(mut res) => res.take::<Vec<MetadataRow>>(0),
                Err(e) => Err(e),
            };
            match result {
                Ok(rows) => return Self::single(id, rows),
                Err(e) if attempt < MAX_ATTEMPTS && is_retryable(&e) => {
                    debug!(memory_id = %id, attempt, "metadata upsert conflict, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn single(id: &MemoryId, rows: Vec<MetadataRow>) -> StorageResult<MetadataEntry> {
        rows.into_iter()
            .next()
            .map(MetadataRow::into_entry)
            .ok_or_else(|| StorageError::Backend(format!("upsert returned no row for {id}")))
    }
}

#[async_trait]
impl MetadataStore for SurrealMetadataStore {
    async fn set_importance(
        &self,
        id: &MemoryId,
        importance: f64,
    ) -> StorageResult<MetadataEntry> {
        self.upsert(SET_IMPORTANCE, id, Some(importance)).await
    }

    async fn bump_access(&self, id: &MemoryId) -> StorageResult<MetadataEntry> {
        self.upsert(BUMP_ACCESS, id, None).await
    }

    async fn get(&self, id: &MemoryId) -> StorageResult<Option<MetadataEntry>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('memory_metadata', $mid)")
            .bind(("mid", id.as_str().to_string()))
            .await?;

        let rows: Vec<MetadataRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(MetadataRow::into_entry))
    }

    async fn delete(&self, id: &MemoryId) -> StorageResult<bool> {
        let _guard = self.write_locks.lock(id.as_str()).await;
        let mut res = self
            .db
            .query("DELETE type::thing('memory_metadata', $mid) RETURN BEFORE")
            .bind(("mid", id.as_str().to_string()))
            .await?;

        let removed: Vec<MetadataRow> = res.take(0)?;
        Ok(!removed.is_empty())
    }

    async fn list(&self) -> StorageResult<Vec<MetadataEntry>> {
        let mut res = self
            .db
            .query("SELECT * FROM memory_metadata ORDER BY memory_id ASC")
            .await?;

        let rows: Vec<MetadataRow> = res.take(0)?;
        Ok(rows.into_iter().map(MetadataRow::into_entry).collect())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.db.query("DELETE memory_metadata").await?.check()?;
        Ok(())
    }
}
