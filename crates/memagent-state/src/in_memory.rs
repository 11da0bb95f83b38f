//! In-process implementations of the storage traits
//!
//! Provides `InMemoryRecordStore`, `InMemoryMetadataStore`, and
//! `InMemoryHistoryLog`. Each store keeps its state behind a single mutex so
//! every trait call is one atomic step, which is what makes the per-id
//! read-modify-write guarantees hold without extra coordination.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| StorageError::LockPoisoned)
}

// ---------------------------------------------------------------------------
// InMemoryRecordStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RecordTable {
    /// id -> (insertion order, record)
    live: HashMap<String, (u64, MemoryRecord)>,
    retired: HashSet<String>,
    next_order: u64,
}

/// Record store backed by a `HashMap<id, record>` with brute-force search.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    table: Mutex<RecordTable>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: MemoryRecord) -> StorageResult<()> {
        let mut table = lock(&self.table)?;
        let key = record.id.as_str().to_string();
        if table.live.contains_key(&key) || table.retired.contains(&key) {
            return Err(StorageError::IdConflict { id: key });
        }
        let order = table.next_order;
        table.next_order += 1;
        table.live.insert(key, (order, record));
        Ok(())
    }

    async fn replace_content(
        &self,
        id: &MemoryId,
        content: &str,
        embedding: Vec<f32>,
    ) -> StorageResult<MemoryRecord> {
        let mut table = lock(&self.table)?;
        let (_, record) = table
            .live
            .get_mut(id.as_str())
            .ok_or_else(|| StorageError::NotFound {
                id: id.to_string(),
            })?;
        record.content = content.to_string();
        record.embedding = embedding;
        record.updated_at = Utc::now().max(record.updated_at);
        Ok(record.clone())
    }

    async fn delete(&self, id: &MemoryId) -> StorageResult<bool> {
        let mut table = lock(&self.table)?;
        let removed = table.live.remove(id.as_str()).is_some();
        if removed {
            table.retired.insert(id.as_str().to_string());
        }
        Ok(removed)
    }

    async fn get(&self, id: &MemoryId) -> StorageResult<Option<MemoryRecord>> {
        let table = lock(&self.table)?;
        Ok(table.live.get(id.as_str()).map(|(_, r)| r.clone()))
    }

    async fn list(&self, scope: &Scope) -> StorageResult<Vec<MemoryRecord>> {
        let table = lock(&self.table)?;
        let mut rows: Vec<&(u64, MemoryRecord)> = table
            .live
            .values()
            .filter(|(_, r)| scope.matches(&r.scope))
            .collect();
        rows.sort_by_key(|(order, _)| *order);
        Ok(rows.into_iter().map(|(_, r)| r.clone()).collect())
    }

    async fn search(
        &self,
        embedding: &[f32],
        scope: &Scope,
        limit: usize,
        max_distance: f32,
    ) -> StorageResult<Vec<ScoredRecord>> {
        let table = lock(&self.table)?;
        let mut hits: Vec<(u64, ScoredRecord)> = table
            .live
            .values()
            .filter(|(_, r)| scope.matches(&r.scope))
            .filter_map(|(order, r)| {
                let distance = cosine_distance(embedding, &r.embedding);
                (distance < max_distance).then(|| {
                    (
                        *order,
                        ScoredRecord {
                            record: r.clone(),
                            distance,
                        },
                    )
                })
            })
            .collect();
        // Nearest first, insertion order breaks ties.
        hits.sort_by(|(oa, a), (ob, b)| a.distance.total_cmp(&b.distance).then(oa.cmp(ob)));
        hits.truncate(limit);
        Ok(hits.into_iter().map(|(_, hit)| hit).collect())
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut table = lock(&self.table)?;
        let ids: Vec<String> = table.live.keys().cloned().collect();
        table.retired.extend(ids);
        table.live.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryMetadataStore
// ---------------------------------------------------------------------------

/// Metadata store backed by a `HashMap<id, MetadataEntry>`.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: Mutex<HashMap<String, MetadataEntry>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn set_importance(
        &self,
        id: &MemoryId,
        importance: f64,
    ) -> StorageResult<MetadataEntry> {
        let mut entries = lock(&self.entries)?;
        let entry = entries
            .entry(id.as_str().to_string())
            .and_modify(|e| e.importance = importance)
            .or_insert_with(|| MetadataEntry {
                memory_id: id.clone(),
                importance,
                access_count: 1,
                last_accessed_at: Utc::now(),
            });
        Ok(entry.clone())
    }

    async fn bump_access(&self, id: &MemoryId) -> StorageResult<MetadataEntry> {
        let mut entries = lock(&self.entries)?;
        let now = Utc::now();
        let entry = entries
            .entry(id.as_str().to_string())
            .and_modify(|e| {
                e.access_count += 1;
                e.last_accessed_at = e.last_accessed_at.max(now);
            })
            .or_insert_with(|| MetadataEntry {
                memory_id: id.clone(),
                importance: 0.0,
                access_count: 1,
                last_accessed_at: now,
            });
        Ok(entry.clone())
    }

    async fn get(&self, id: &MemoryId) -> StorageResult<Option<MetadataEntry>> {
        let entries = lock(&self.entries)?;
        Ok(entries.get(id.as_str()).cloned())
    }

    async fn delete(&self, id: &MemoryId) -> StorageResult<bool> {
        let mut entries = lock(&self.entries)?;
        Ok(entries.remove(id.as_str()).is_some())
    }

    async fn list(&self) -> StorageResult<Vec<MetadataEntry>> {
        let entries = lock(&self.entries)?;
        let mut all: Vec<MetadataEntry> = entries.values().cloned().collect();
        all.sort_by(|a, b| a.memory_id.cmp(&b.memory_id));
        Ok(all)
    }

    async fn clear(&self) -> StorageResult<()> {
        lock(&self.entries)?.clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InMemoryHistoryLog
// ---------------------------------------------------------------------------

/// History ledger backed by a `HashMap<id, Vec<HistoryEntry>>`.
///
/// Each id maps to its entries in append order (oldest first).
#[derive(Debug, Default)]
pub struct InMemoryHistoryLog {
    ledger: Mutex<HashMap<String, Vec<HistoryEntry>>>,
}

impl InMemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryLog for InMemoryHistoryLog {
    async fn append(
        &self,
        memory_id: &MemoryId,
        action: HistoryAction,
        payload: &str,
    ) -> StorageResult<HistoryEntry> {
        let mut ledger = lock(&self.ledger)?;
        let entries = ledger.entry(memory_id.as_str().to_string()).or_default();
        let now = Utc::now();
        let (seq, timestamp) = match entries.last() {
            Some(last) => (last.seq + 1, now.max(last.timestamp)),
            None => (1, now),
        };
        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            memory_id: memory_id.clone(),
            seq,
            action,
            payload: payload.to_string(),
            timestamp,
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn history(&self, memory_id: &MemoryId) -> StorageResult<Vec<HistoryEntry>> {
        let ledger = lock(&self.ledger)?;
        Ok(ledger.get(memory_id.as_str()).cloned().unwrap_or_default())
    }

    async fn clear(&self) -> StorageResult<()> {
        lock(&self.ledger)?.clear();
        Ok(())
    }
}
