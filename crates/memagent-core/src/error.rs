//! Error types for the memory engine.

use memagent_state::{HistoryAction, MemoryId, StorageError};

/// Failure reported by an external capability (embedding or completion).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityError {
    /// Backend unreachable, timed out or returned a non-success status.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// Backend answered, but the body could not be interpreted.
    #[error("invalid capability response: {0}")]
    InvalidResponse(String),
}

/// Errors produced by memory engine operations.
///
/// Decision-parsing and target-liveness anomalies are not errors; they are
/// reported as [`crate::Degradation`] values on a successful result.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("embedding capability unavailable: {0}")]
    EmbeddingUnavailable(#[source] CapabilityError),

    #[error("language model unavailable: {0}")]
    LanguageModelUnavailable(#[source] CapabilityError),

    /// The store mutation for `action` committed (or not) but the paired
    /// history append did not; store and ledger may have diverged.
    #[error(
        "partial failure on {action} of {memory_id}: store_ok={store_ok}, history_ok={history_ok}: {source}"
    )]
    PartialFailure {
        memory_id: MemoryId,
        action: HistoryAction,
        store_ok: bool,
        history_ok: bool,
        #[source]
        source: StorageError,
    },

    #[error("memory not found: {id}")]
    NotFound { id: MemoryId },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MemoryError {
    /// True for the capability-unavailable family.
    pub fn is_capability_unavailable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_) | Self::LanguageModelUnavailable(_)
        )
    }
}

/// Result type for memory engine operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_display() {
        let err = MemoryError::NotFound {
            id: MemoryId::from("m1"),
        };
        assert_eq!(err.to_string(), "memory not found: m1");

        let err = MemoryError::PartialFailure {
            memory_id: MemoryId::from("m1"),
            action: HistoryAction::Update,
            store_ok: true,
            history_ok: false,
            source: StorageError::Backend("disk full".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("UPDATE"));
        assert!(msg.contains("history_ok=false"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_capability_family() {
        let err = MemoryError::EmbeddingUnavailable(CapabilityError::Unavailable("503".into()));
        assert!(err.is_capability_unavailable());
        assert!(!MemoryError::Config("x".into()).is_capability_unavailable());
    }

    #[test]
    fn test_storage_error_converts() {
        let err: MemoryError = StorageError::LockPoisoned.into();
        assert!(matches!(err, MemoryError::Storage(StorageError::LockPoisoned)));
    }
}
