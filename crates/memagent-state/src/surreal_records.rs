//! SurrealDB-backed RecordStore implementation
//!
//! Uses `schema::MemoryRecordRow` and `schema::TombstoneRow` for persistence,
//! converting to/from `storage_traits` types at the boundary. Similarity is
//! computed in-process over the scoped candidate set.

use async_trait::async_trait;
use chrono::Utc;
use surrealdb::engine::any::Any;
use surrealdb::method::Query;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::debug;

use crate::error::StorageError;
use crate::schema::{MemoryRecordRow, TombstoneRow};
use crate::storage_traits::{
    cosine_distance, MemoryId, MemoryRecord, RecordStore, Scope, ScoredRecord, StorageResult,
};

/// SurrealDB-backed implementation of [`RecordStore`].
pub struct SurrealRecordStore {
    db: Surreal<Any>,
}

impl SurrealRecordStore {
    /// Wrap a connection whose schema has already been initialized.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(crate::StateHandle::setup_db().await?.record_store())
    }

    fn scoped<'a>(&'a self, select: &str, scope: &Scope, tail: &str) -> Query<'a, Any> {
        let sql = match scope_clause(scope) {
            Some(clause) => format!("{select} WHERE {clause} {tail}"),
            None => format!("{select} {tail}"),
        };
        let mut query = self.db.query(sql);
        if let Some(user_id) = &scope.user_id {
            query = query.bind(("user_id", user_id.clone()));
        }
        if let Some(agent_id) = &scope.agent_id {
            query = query.bind(("agent_id", agent_id.clone()));
        }
        if let Some(run_id) = &scope.run_id {
            query = query.bind(("run_id", run_id.clone()));
        }
        query
    }

    /// Tombstone an id. An id that is already tombstoned stays retired.
    async fn retire(&self, memory_id: String) -> StorageResult<()> {
        let created: Result<Option<TombstoneRow>, surrealdb::Error> = self
            .db
            .create("memory_tombstones")
            .content(TombstoneRow::new(memory_id))
            .await;
        match created {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// `WHERE` conditions for the constrained scope fields, or `None` when the
/// scope matches everything.
fn scope_clause(scope: &Scope) -> Option<String> {
    let mut conditions = Vec::new();
    if scope.user_id.is_some() {
        conditions.push("user_id = $user_id");
    }
    if scope.agent_id.is_some() {
        conditions.push("agent_id = $agent_id");
    }
    if scope.run_id.is_some() {
        conditions.push("run_id = $run_id");
    }
    (!conditions.is_empty()).then(|| conditions.join(" AND "))
}

fn is_unique_violation(err: &surrealdb::Error) -> bool {
    err.to_string().contains("already contains")
}

#[async_trait]
impl RecordStore for SurrealRecordStore {
    async fn insert(&self, record: MemoryRecord) -> StorageResult<()> {
        let mid = record.id.as_str().to_string();
        let mut res = self
            .db
            .query(
                "SELECT VALUE memory_id FROM memory_tombstones WHERE memory_id = $mid; \
                 SELECT VALUE memory_id FROM memory_records WHERE memory_id = $mid;",
            )
            .bind(("mid", mid.clone()))
            .await?;
        let retired: Vec<String> = res.take(0)?;
        let live: Vec<String> = res.take(1)?;
        if !retired.is_empty() || !live.is_empty() {
            return Err(StorageError::IdConflict { id: mid });
        }

        debug!(memory_id = %mid, "inserting record");

        let created: Result<Option<MemoryRecordRow>, surrealdb::Error> = self
            .db
            .create("memory_records")
            .content(MemoryRecordRow::from_record(record))
            .await;
        match created {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorageError::IdConflict { id: mid }),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_content(
        &self,
        id: &MemoryId,
        content: &str,
        embedding: Vec<f32>,
    ) -> StorageResult<MemoryRecord> {
        let mut res = self
            .db
            .query(
                "UPDATE memory_records SET \
                    content = $content, \
                    embedding = $embedding, \
                    updated_at = IF updated_at > $now THEN updated_at ELSE $now END \
                 WHERE memory_id = $mid RETURN AFTER",
            )
            .bind(("mid", id.as_str().to_string()))
            .bind(("content", content.to_string()))
            .bind(("embedding", embedding))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let rows: Vec<MemoryRecordRow> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(MemoryRecordRow::into_record)
            .ok_or_else(|| StorageError::NotFound {
                id: id.to_string(),
            })
    }

    async fn delete(&self, id: &MemoryId) -> StorageResult<bool> {
        let mid = id.as_str().to_string();
        let mut res = self
            .db
            .query("SELECT VALUE memory_id FROM memory_records WHERE memory_id = $mid")
            .bind(("mid", mid.clone()))
            .await?;
        let live: Vec<String> = res.take(0)?;
        if live.is_empty() {
            return Ok(false);
        }

        // Tombstone first: the record removal is the last write, so an
        // error never hides a removal that already happened.
        self.retire(mid.clone()).await?;

        let mut res = self
            .db
            .query("DELETE memory_records WHERE memory_id = $mid RETURN BEFORE")
            .bind(("mid", mid))
            .await?;
        let removed: Vec<MemoryRecordRow> = res.take(0)?;
        Ok(!removed.is_empty())
    }

    async fn get(&self, id: &MemoryId) -> StorageResult<Option<MemoryRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM memory_records WHERE memory_id = $mid")
            .bind(("mid", id.as_str().to_string()))
            .await?;

        let rows: Vec<MemoryRecordRow> = res.take(0)?;
        Ok(rows.into_iter().next().map(MemoryRecordRow::into_record))
    }

    async fn list(&self, scope: &Scope) -> StorageResult<Vec<MemoryRecord>> {
        let mut res = self
            .scoped(
                "SELECT * FROM memory_records",
                scope,
                "ORDER BY created_at ASC",
            )
            .await?;

        let rows: Vec<MemoryRecordRow> = res.take(0)?;
        Ok(rows.into_iter().map(MemoryRecordRow::into_record).collect())
    }

    async fn search(
        &self,
        embedding: &[f32],
        scope: &Scope,
        limit: usize,
        max_distance: f32,
    ) -> StorageResult<Vec<ScoredRecord>> {
        let candidates = self.list(scope).await?;
        let mut hits: Vec<ScoredRecord> = candidates
            .into_iter()
            .filter_map(|record| {
                let distance = cosine_distance(embedding, &record.embedding);
                (distance < max_distance).then_some(ScoredRecord { record, distance })
            })
            .collect();
        // Stable sort keeps creation order among equal distances.
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut res = self
            .db
            .query("SELECT VALUE memory_id FROM memory_records")
            .await?;
        let ids: Vec<String> = res.take(0)?;

        for mid in ids {
            self.retire(mid).await?;
        }

        self.db.query("DELETE memory_records").await?.check()?;
        Ok(())
    }
}
