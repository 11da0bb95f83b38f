//! Capability interfaces the engine consumes.
//!
//! Embedding and text completion are supplied from outside; fact
//! extraction, importance grading and the consolidation decision are
//! layered on top of completion (see [`crate::extraction`] and
//! [`crate::decision`]) but may be replaced by any policy implementing the
//! same trait.

use async_trait::async_trait;

use crate::error::CapabilityError;

/// Result type for capability calls.
pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// Text-to-vector mapping.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>>;
}

/// Single-turn text completion.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> CapabilityResult<String>;
}
