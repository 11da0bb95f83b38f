//! MemAgent-State: persistence layer for agent memories
//!
//! This crate owns everything the consolidation engine stores: the memory
//! records themselves, their strength metadata, and the append-only history
//! ledger that explains every mutation.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: per-record atomicity, append-only audit, scoped queries.
//!
//! ## Key Components
//!
//! - `RecordStore`, `MetadataStore`, `HistoryLog`: backend-agnostic traits
//! - `in_memory`: process-local implementations of all three traits
//! - `StateHandle`: SurrealDB connection that hands out the Surreal-backed stores

mod error;
mod handle;
pub mod in_memory;
pub mod locks;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_history;
pub mod surreal_metadata;
pub mod surreal_records;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, StateHandle};
pub use in_memory::{InMemoryHistoryLog, InMemoryMetadataStore, InMemoryRecordStore};
pub use locks::{KeyGuard, KeyedLocks};
pub use storage_traits::{
    cosine_distance, HistoryAction, HistoryEntry, HistoryLog, MemoryId, MemoryRecord,
    MetadataEntry, MetadataStore, RecordStore, Scope, ScoredRecord, StorageResult,
};
pub use surreal_history::SurrealHistoryLog;
pub use surreal_metadata::SurrealMetadataStore;
pub use surreal_records::SurrealRecordStore;

/// Result type for memagent-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
