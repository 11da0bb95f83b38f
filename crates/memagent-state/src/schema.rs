//! Row definitions for the MemAgent SurrealDB tables
//!
//! Tables:
//! - memory_records: live memory content and embeddings
//! - memory_tombstones: ids that were removed and may never be reused
//! - memory_metadata: importance / access bookkeeping
//! - memory_history: append-only mutation ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{
    HistoryAction, HistoryEntry, MemoryId, MemoryRecord, MetadataEntry, Scope, StorageResult,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Memory record row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecordRow {
    /// SurrealDB record ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub memory_id: String,
    pub content: String,
    pub user_id: Option<String>,
    pub agent_id: Option<String>,
    pub run_id: Option<String>,
    pub embedding: Vec<f32>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecordRow {
    pub fn from_record(record: MemoryRecord) -> Self {
        MemoryRecordRow {
            id: None,
            memory_id: record.id.0,
            content: record.content,
            user_id: record.scope.user_id,
            agent_id: record.scope.agent_id,
            run_id: record.scope.run_id,
            embedding: record.embedding,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn into_record(self) -> MemoryRecord {
        MemoryRecord {
            id: MemoryId(self.memory_id),
            content: self.content,
            scope: Scope {
                user_id: self.user_id,
                agent_id: self.agent_id,
                run_id: self.run_id,
            },
            embedding: self.embedding,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Retired id row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TombstoneRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub memory_id: String,
    #[serde(with = "surreal_datetime")]
    pub retired_at: DateTime<Utc>,
}

impl TombstoneRow {
    pub fn new(memory_id: String) -> Self {
        TombstoneRow {
            id: None,
            memory_id,
            retired_at: Utc::now(),
        }
    }
}

/// Metadata row, keyed by `memory_metadata:<memory_id>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub memory_id: String,
    pub importance: f64,
    pub access_count: u64,
    #[serde(with = "surreal_datetime")]
    pub last_accessed_at: DateTime<Utc>,
}

impl MetadataRow {
    pub fn into_entry(self) -> MetadataEntry {
        MetadataEntry {
            memory_id: MemoryId(self.memory_id),
            importance: self.importance,
            access_count: self.access_count,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

/// History ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub entry_id: String,
    pub memory_id: String,
    /// Monotonic sequence number within the memory id (1-indexed)
    pub seq: u64,
    pub action: String,
    pub payload: String,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl HistoryRow {
    pub fn new(
        memory_id: String,
        seq: u64,
        action: HistoryAction,
        payload: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        HistoryRow {
            id: None,
            entry_id: uuid::Uuid::new_v4().to_string(),
            memory_id,
            seq,
            action: action.as_str().to_string(),
            payload,
            timestamp,
        }
    }

    pub fn into_entry(self) -> StorageResult<HistoryEntry> {
        Ok(HistoryEntry {
            id: self.entry_id,
            memory_id: MemoryId(self.memory_id),
            seq: self.seq,
            action: self.action.parse()?,
            payload: self.payload,
            timestamp: self.timestamp,
        })
    }
}
