//! Deterministic stub capabilities shared by the engine tests.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use memagent_core::{
    CapabilityError, CapabilityResult, Capabilities, Decision, DecisionMaker, Embedder,
    EngineConfig, FactExtractor, ImportanceScorer, MemoryEngine, Stores,
};
use memagent_state::storage_traits::*;
pub use memagent_state::{HistoryLog, MetadataStore, RecordStore};
use memagent_state::{InMemoryHistoryLog, InMemoryMetadataStore, InMemoryRecordStore, StorageError};

const DIMS: usize = 64;

/// Bag-of-words embedder: each (crudely singularised) word hashes into one
/// of 64 buckets.
pub struct HashEmbedder;

fn normalise(word: &str) -> String {
    let lower = word.to_lowercase();
    match lower.strip_suffix('s') {
        Some(stem) if stem.len() > 2 => stem.to_string(),
        _ => lower,
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>> {
        let mut v = vec![0.0f32; DIMS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let mut h = DefaultHasher::new();
            normalise(word).hash(&mut h);
            v[(h.finish() % DIMS as u64) as usize] += 1.0;
        }
        Ok(v)
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> CapabilityResult<Vec<f32>> {
        Err(CapabilityError::Unavailable("embedding backend down".into()))
    }
}

/// Splits on commas, like the completion-backed extractor would.
pub struct CommaFacts;

#[async_trait]
impl FactExtractor for CommaFacts {
    async fn extract_facts(&self, content: &str) -> CapabilityResult<Vec<String>> {
        Ok(content
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Returns a fixed fact list (or error) regardless of content.
pub struct FixedFacts(pub CapabilityResult<Vec<String>>);

#[async_trait]
impl FactExtractor for FixedFacts {
    async fn extract_facts(&self, _content: &str) -> CapabilityResult<Vec<String>> {
        self.0.clone()
    }
}

/// Returns a fixed grade (or error).
pub struct FixedImportance(pub CapabilityResult<Option<f64>>);

#[async_trait]
impl ImportanceScorer for FixedImportance {
    async fn score(&self, _content: &str) -> CapabilityResult<Option<f64>> {
        self.0.clone()
    }
}

/// Plays back queued decisions, then answers `Add`. Records the related
/// ids it was shown on each call.
#[derive(Default)]
pub struct ScriptedDecider {
    script: Mutex<VecDeque<CapabilityResult<Decision>>>,
    pub shown: Mutex<Vec<Vec<MemoryId>>>,
}

impl ScriptedDecider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, decision: Decision) {
        self.script.lock().unwrap().push_back(Ok(decision));
    }

    pub fn push_err(&self, err: CapabilityError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.shown.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionMaker for ScriptedDecider {
    async fn decide(&self, _content: &str, related: &[MemoryRecord]) -> CapabilityResult<Decision> {
        self.shown
            .lock()
            .unwrap()
            .push(related.iter().map(|r| r.id.clone()).collect());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Decision::Add))
    }
}

/// In-memory ledger whose appends can be switched to fail.
#[derive(Default)]
pub struct FlakyHistoryLog {
    inner: InMemoryHistoryLog,
    pub failing: AtomicBool,
    pub failed_appends: AtomicUsize,
}

#[async_trait]
impl HistoryLog for FlakyHistoryLog {
    async fn append(
        &self,
        memory_id: &MemoryId,
        action: HistoryAction,
        payload: &str,
    ) -> StorageResult<HistoryEntry> {
        if self.failing.load(Ordering::SeqCst) {
            self.failed_appends.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Backend("ledger unavailable".into()));
        }
        self.inner.append(memory_id, action, payload).await
    }

    async fn history(&self, memory_id: &MemoryId) -> StorageResult<Vec<HistoryEntry>> {
        self.inner.history(memory_id).await
    }

    async fn clear(&self) -> StorageResult<()> {
        self.inner.clear().await
    }
}

pub fn capabilities(decider: Arc<ScriptedDecider>) -> Capabilities {
    Capabilities {
        embedder: Arc::new(HashEmbedder),
        facts: Arc::new(CommaFacts),
        importance: Arc::new(FixedImportance(Ok(Some(0.8)))),
        decider,
    }
}

pub struct Harness {
    pub engine: MemoryEngine,
    pub stores: Stores,
    pub decider: Arc<ScriptedDecider>,
}

pub fn harness() -> Harness {
    let decider = ScriptedDecider::new();
    harness_with(Stores::in_memory(), capabilities(decider.clone()), decider)
}

pub fn harness_with(stores: Stores, caps: Capabilities, decider: Arc<ScriptedDecider>) -> Harness {
    let engine = MemoryEngine::new(stores.clone(), caps, EngineConfig::default());
    Harness {
        engine,
        stores,
        decider,
    }
}

/// In-memory stores whose ledger can be made to fail.
pub fn flaky_stores() -> (Stores, Arc<FlakyHistoryLog>) {
    let history = Arc::new(FlakyHistoryLog::default());
    let stores = Stores {
        records: Arc::new(InMemoryRecordStore::new()),
        metadata: Arc::new(InMemoryMetadataStore::new()),
        history: history.clone(),
    };
    (stores, history)
}

pub async fn actions(engine: &MemoryEngine, id: &MemoryId) -> Vec<HistoryAction> {
    engine
        .history(id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect()
}
