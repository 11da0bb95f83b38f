//! Error types for memagent-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the backing database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors returned by the storage trait operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// No live record, metadata row or history entry exists for the id
    #[error("not found: {id}")]
    NotFound { id: String },

    /// A record with this id is live or was retired earlier
    #[error("memory id already used: {id}")]
    IdConflict { id: String },

    /// The backend rejected or failed the operation
    #[error("storage backend error: {0}")]
    Backend(String),

    /// An in-process lock was poisoned by a panicking writer
    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotFound {
            id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "not found: abc");

        let err = StorageError::IdConflict {
            id: "abc".to_string(),
        };
        assert!(err.to_string().contains("already used"));
    }

    #[test]
    fn test_state_error_converts_to_backend() {
        let err: StorageError = StateError::SchemaSetup("boom".to_string()).into();
        assert!(matches!(err, StorageError::Backend(msg) if msg.contains("boom")));
    }
}
