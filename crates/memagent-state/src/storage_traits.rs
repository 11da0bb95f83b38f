//! Storage trait definitions for MemAgent
//!
//! These traits define the three stores a memory pool is made of:
//! - `RecordStore`: memory content plus its searchable embedding
//! - `MetadataStore`: importance / access bookkeeping used for strength
//! - `HistoryLog`: append-only ledger of every record mutation
//!
//! All traits are async and backend-agnostic. The three stores never share a
//! transaction boundary; callers coordinate them per record id.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identity and scope
// ---------------------------------------------------------------------------

/// Unique identifier for a memory record.
///
/// Generated once at creation and never reused after the record is removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub String);

impl MemoryId {
    /// Generate a new random MemoryId
    pub fn new() -> Self {
        MemoryId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MemoryId {
    fn from(value: &str) -> Self {
        MemoryId(value.to_string())
    }
}

impl From<String> for MemoryId {
    fn from(value: String) -> Self {
        MemoryId(value)
    }
}

/// Partition tags on a record, and the filter used to select records.
///
/// As a filter, every field that is `Some` must match the record's tag
/// exactly; `None` fields are wildcards. The same filter drives search,
/// listing and bulk deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl Scope {
    /// Filter that matches every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Scope for a single user.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::default().with_user(user_id)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// True when no field is constrained.
    pub fn is_unscoped(&self) -> bool {
        self.user_id.is_none() && self.agent_id.is_none() && self.run_id.is_none()
    }

    /// Whether a record tagged with `tags` falls inside this filter.
    pub fn matches(&self, tags: &Scope) -> bool {
        fn field_matches(filter: &Option<String>, tag: &Option<String>) -> bool {
            match filter {
                Some(wanted) => tag.as_deref() == Some(wanted.as_str()),
                None => true,
            }
        }

        field_matches(&self.user_id, &tags.user_id)
            && field_matches(&self.agent_id, &tags.agent_id)
            && field_matches(&self.run_id, &tags.run_id)
    }
}

// ---------------------------------------------------------------------------
// RecordStore: memory content and embeddings
// ---------------------------------------------------------------------------

/// A live memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub content: String,
    pub scope: Scope,
    /// Searchable representation, produced by the embedding capability.
    #[serde(default, skip_serializing)]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build a record with a freshly generated id.
    pub fn new(content: impl Into<String>, scope: Scope, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            content: content.into(),
            scope,
            embedding,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A search hit: the record and its cosine distance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub distance: f32,
}

/// Cosine distance (`1 - cosine similarity`) between two vectors.
///
/// Vectors of different length are infinitely far apart; a zero vector is
/// treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return f32::INFINITY;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Durable keyed storage for memory records.
///
/// Guarantees:
/// - No two live records share an id; an id removed once is never accepted again.
/// - `replace_content` and `delete` check liveness in the same step as the
///   mutation, so a concurrent removal is observed rather than overwritten.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new record. Fails with `IdConflict` if the id is live or retired.
    async fn insert(&self, record: MemoryRecord) -> StorageResult<()>;

    /// Replace content and embedding in place, preserving the id.
    /// Returns `NotFound` if the id is not live.
    async fn replace_content(
        &self,
        id: &MemoryId,
        content: &str,
        embedding: Vec<f32>,
    ) -> StorageResult<MemoryRecord>;

    /// Remove a record. Returns `false` (not an error) if the id was not live.
    async fn delete(&self, id: &MemoryId) -> StorageResult<bool>;

    /// Fetch a live record.
    async fn get(&self, id: &MemoryId) -> StorageResult<Option<MemoryRecord>>;

    /// List live records matching the scope, oldest first.
    async fn list(&self, scope: &Scope) -> StorageResult<Vec<MemoryRecord>>;

    /// Scoped nearest-neighbour lookup: records strictly closer than
    /// `max_distance`, nearest first, at most `limit`.
    async fn search(
        &self,
        embedding: &[f32],
        scope: &Scope,
        limit: usize,
        max_distance: f32,
    ) -> StorageResult<Vec<ScoredRecord>>;

    /// Remove every live record. Retired ids stay retired.
    async fn clear(&self) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// MetadataStore: strength bookkeeping
// ---------------------------------------------------------------------------

/// Importance and access bookkeeping for one record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub memory_id: MemoryId,
    pub importance: f64,
    pub access_count: u64,
    pub last_accessed_at: DateTime<Utc>,
}

/// Durable keyed storage for `MetadataEntry` rows.
///
/// Guarantees:
/// - `set_importance` and `bump_access` are atomic read-modify-writes per id;
///   concurrent bumps never lose an increment.
/// - `last_accessed_at` never moves backward for an id.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Upsert importance. A new entry starts with `access_count = 1` and
    /// `last_accessed_at = now`; an existing entry keeps its access data.
    async fn set_importance(&self, id: &MemoryId, importance: f64)
        -> StorageResult<MetadataEntry>;

    /// Increment `access_count` and refresh `last_accessed_at`. Creates the
    /// entry with `access_count = 1` and zero importance when absent.
    async fn bump_access(&self, id: &MemoryId) -> StorageResult<MetadataEntry>;

    /// Fetch the entry for an id, if any.
    async fn get(&self, id: &MemoryId) -> StorageResult<Option<MetadataEntry>>;

    /// Remove the entry. Returns `false` if there was none.
    async fn delete(&self, id: &MemoryId) -> StorageResult<bool>;

    /// All entries, including ones whose record is gone.
    async fn list(&self) -> StorageResult<Vec<MetadataEntry>>;

    /// Remove every entry.
    async fn clear(&self) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// HistoryLog: append-only audit ledger
// ---------------------------------------------------------------------------

/// Kind of mutation recorded in the history ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryAction {
    Add,
    Update,
    Delete,
    Decay,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Decay => "DECAY",
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(Self::Add),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            "DECAY" => Ok(Self::Decay),
            other => Err(StorageError::Backend(format!(
                "unknown history action: {other}"
            ))),
        }
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Generated entry id
    pub id: String,
    /// Record this entry describes; may reference a removed record
    pub memory_id: MemoryId,
    /// 1-indexed position within the record's history
    pub seq: u64,
    pub action: HistoryAction,
    /// New content for ADD/UPDATE, empty for DELETE/DECAY
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only mutation ledger.
///
/// Guarantees:
/// - `history(id)` returns entries in exactly the order they were appended.
/// - `seq` and `timestamp` are non-decreasing per record id.
/// - `append` never checks that the record is live.
#[async_trait]
pub trait HistoryLog: Send + Sync {
    /// Append an entry for `memory_id`.
    async fn append(
        &self,
        memory_id: &MemoryId,
        action: HistoryAction,
        payload: &str,
    ) -> StorageResult<HistoryEntry>;

    /// Entries for one id in append order; empty if there are none.
    async fn history(&self, memory_id: &MemoryId) -> StorageResult<Vec<HistoryEntry>>;

    /// Drop the whole ledger (pool reset only).
    async fn clear(&self) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_wildcards() {
        let tags = Scope::user("u1").with_agent("a1");
        assert!(Scope::all().matches(&tags));
        assert!(Scope::user("u1").matches(&tags));
        assert!(Scope::user("u1").with_agent("a1").matches(&tags));
        assert!(!Scope::user("u2").matches(&tags));
        assert!(!Scope::user("u1").with_run("r1").matches(&tags));
    }

    #[test]
    fn test_scope_is_unscoped() {
        assert!(Scope::all().is_unscoped());
        assert!(!Scope::default().with_run("r").is_unscoped());
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), f32::INFINITY);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_history_action_round_trip_str() {
        for action in [
            HistoryAction::Add,
            HistoryAction::Update,
            HistoryAction::Delete,
            HistoryAction::Decay,
        ] {
            assert_eq!(action.as_str().parse::<HistoryAction>().unwrap(), action);
        }
        assert!("UPSERT".parse::<HistoryAction>().is_err());
    }

    #[test]
    fn test_memory_ids_are_unique() {
        assert_ne!(MemoryId::new(), MemoryId::new());
    }
}
