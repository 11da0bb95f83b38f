//! MemAgent Core Library
//!
//! The consolidation and decay engine for an agent's memory pool: new
//! content is reconciled against related memories (add, update or retire),
//! memories are scored by importance, access frequency and recency, and
//! weak ones are swept away. Every mutation is recorded in an append-only
//! history ledger.
//!
//! Storage lives in `memagent-state`; embedding and completion are
//! capabilities passed in at construction (see [`Capabilities`]).

pub mod capability;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod metrics;
pub mod obs;
pub mod openai;
pub mod retention;
pub mod telemetry;

pub use capability::{CapabilityResult, Embedder, LanguageModel};
pub use config::EngineConfig;
pub use decision::{Decision, DecisionMaker, LlmDecisionMaker};
pub use engine::{
    Capabilities, ConsolidationEvent, ConsolidationResult, Degradation, MemoryEngine, Stores,
};
pub use error::{CapabilityError, MemoryError, MemoryResult};
pub use extraction::{FactExtractor, ImportanceScorer, LlmFactExtractor, LlmImportanceScorer};
pub use metrics::{Metrics, MetricsSnapshot};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use retention::{strength, DecayFailure, DecayReport};
pub use telemetry::init_tracing;

pub use memagent_state::{
    HistoryAction, HistoryEntry, MemoryId, MemoryRecord, MetadataEntry, Scope, ScoredRecord,
    StateHandle,
};
