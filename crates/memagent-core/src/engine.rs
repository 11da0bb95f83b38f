//! The memory engine: consolidation, direct operations and decay.
//!
//! Every store mutation is paired with exactly one history append. The pair
//! runs inside a spawned task while holding the per-id lock, so dropping
//! the caller's future cannot leave a mutation without its ledger entry
//! and two operations on one id never interleave their pairs.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use memagent_state::{
    HistoryAction, HistoryEntry, HistoryLog, InMemoryHistoryLog, InMemoryMetadataStore,
    InMemoryRecordStore, KeyedLocks, MemoryId, MemoryRecord, MetadataEntry, MetadataStore,
    RecordStore, Scope, ScoredRecord, StateHandle, StorageError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, Instrument};

use crate::capability::{Embedder, LanguageModel};
use crate::config::EngineConfig;
use crate::decision::{Decision, DecisionMaker, LlmDecisionMaker};
use crate::error::{MemoryError, MemoryResult};
use crate::extraction::{FactExtractor, ImportanceScorer, LlmFactExtractor, LlmImportanceScorer};
use crate::metrics::Metrics;
use crate::obs;
use crate::retention::{self, DecayFailure, DecayReport};

/// The three stores that make up one memory pool.
#[derive(Clone)]
pub struct Stores {
    pub records: Arc<dyn RecordStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub history: Arc<dyn HistoryLog>,
}

impl Stores {
    /// Process-local pool.
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(InMemoryRecordStore::new()),
            metadata: Arc::new(InMemoryMetadataStore::new()),
            history: Arc::new(InMemoryHistoryLog::new()),
        }
    }

    /// Pool persisted through a SurrealDB connection.
    pub fn surreal(handle: &StateHandle) -> Self {
        Self {
            records: Arc::new(handle.record_store()),
            metadata: Arc::new(handle.metadata_store()),
            history: Arc::new(handle.history_log()),
        }
    }
}

/// External capabilities the engine calls out to.
#[derive(Clone)]
pub struct Capabilities {
    pub embedder: Arc<dyn Embedder>,
    pub facts: Arc<dyn FactExtractor>,
    pub importance: Arc<dyn ImportanceScorer>,
    pub decider: Arc<dyn DecisionMaker>,
}

impl Capabilities {
    /// Fact extraction, importance grading and decisions all driven by one
    /// completion model.
    pub fn from_language_model(embedder: Arc<dyn Embedder>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            embedder,
            facts: Arc::new(LlmFactExtractor::new(model.clone())),
            importance: Arc::new(LlmImportanceScorer::new(model.clone())),
            decider: Arc::new(LlmDecisionMaker::new(model)),
        }
    }
}

/// Which effect a consolidation had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationEvent {
    Added,
    Updated,
    Deleted,
    /// A DELETE directive named an id that was not live; nothing changed.
    Skipped,
}

/// A recovered anomaly. Never fatal, always logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Fact extraction failed; the whole content was used as one fact.
    ExtractionDegraded { reason: String },
    /// Importance grading failed or had no number; the default was used.
    ImportanceDefaulted { reason: String, importance: f64 },
    /// The decider's answer was unrecognized; content was added.
    MalformedDecision { raw: String },
    /// An UPDATE or DELETE named an id that was not live.
    TargetNotLive { id: MemoryId, action: HistoryAction },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationResult {
    pub event: ConsolidationEvent,
    /// The record added, updated or deleted; for `Skipped`, the id named.
    pub memory_id: MemoryId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
}

struct Inner {
    stores: Stores,
    caps: Capabilities,
    config: EngineConfig,
    locks: KeyedLocks,
    metrics: Metrics,
}

/// Consolidation and decay engine over one memory pool.
///
/// Cloning is cheap and shares the pool, capabilities, locks and counters.
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<Inner>,
}

impl MemoryEngine {
    pub fn new(stores: Stores, capabilities: Capabilities, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                stores,
                caps: capabilities,
                config,
                locks: KeyedLocks::new(),
                metrics: Metrics::new(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Run a mutation pair to completion regardless of the caller.
    async fn commit<T, F>(&self, task: F) -> MemoryResult<T>
    where
        T: Send + 'static,
        F: Future<Output = MemoryResult<T>> + Send + 'static,
    {
        tokio::spawn(task.in_current_span())
            .await
            .map_err(|e| MemoryError::Internal(format!("commit task failed: {e}")))?
    }

    // -- consolidation -------------------------------------------------------

    /// Reconcile `content` against related records in `scope` and apply one
    /// of ADD, UPDATE or DELETE.
    #[instrument(skip_all, fields(op = "consolidate"))]
    pub async fn consolidate(
        &self,
        content: &str,
        scope: &Scope,
    ) -> MemoryResult<ConsolidationResult> {
        let mut degradations = Vec::new();

        let facts = match self.inner.caps.facts.extract_facts(content).await {
            Ok(facts) => facts,
            Err(e) => {
                obs::emit_extraction_degraded(&e);
                degradations.push(Degradation::ExtractionDegraded {
                    reason: e.to_string(),
                });
                vec![content.to_string()]
            }
        };

        let decision = if facts.is_empty() {
            debug!("no facts extracted, adding directly");
            Decision::Add
        } else {
            let related = self.related(&facts, scope).await?;
            debug!(facts = facts.len(), related = related.len(), "asking for decision");
            self.inner
                .caps
                .decider
                .decide(content, &related)
                .await
                .map_err(MemoryError::LanguageModelUnavailable)?
        };

        self.apply(decision, content, scope, degradations).await
    }

    /// Union of related records over all facts, deduplicated by id in
    /// first-seen order.
    async fn related(&self, facts: &[String], scope: &Scope) -> MemoryResult<Vec<MemoryRecord>> {
        let mut seen = std::collections::HashSet::new();
        let mut related = Vec::new();
        for fact in facts {
            for hit in self.search(fact, scope).await? {
                if seen.insert(hit.record.id.clone()) {
                    related.push(hit.record);
                }
            }
        }
        Ok(related)
    }

    async fn apply(
        &self,
        decision: Decision,
        content: &str,
        scope: &Scope,
        mut degradations: Vec<Degradation>,
    ) -> MemoryResult<ConsolidationResult> {
        match decision {
            Decision::Add => self.add_new(content, scope, degradations).await,
            Decision::Unrecognized { raw } => {
                obs::emit_decision_fallback(&raw);
                self.inner.metrics.inc_decision_fallbacks();
                degradations.push(Degradation::MalformedDecision { raw });
                self.add_new(content, scope, degradations).await
            }
            Decision::Update { id } => match self.replace(&id, content).await? {
                Some(record) => Ok(ConsolidationResult {
                    event: ConsolidationEvent::Updated,
                    memory_id: record.id,
                    degradations,
                }),
                None => {
                    obs::emit_target_not_live(&id, "UPDATE");
                    degradations.push(Degradation::TargetNotLive {
                        id,
                        action: HistoryAction::Update,
                    });
                    self.add_new(content, scope, degradations).await
                }
            },
            Decision::Delete { id } => {
                if self.remove(&id).await? {
                    Ok(ConsolidationResult {
                        event: ConsolidationEvent::Deleted,
                        memory_id: id,
                        degradations,
                    })
                } else {
                    obs::emit_target_not_live(&id, "DELETE");
                    degradations.push(Degradation::TargetNotLive {
                        id: id.clone(),
                        action: HistoryAction::Delete,
                    });
                    Ok(ConsolidationResult {
                        event: ConsolidationEvent::Skipped,
                        memory_id: id,
                        degradations,
                    })
                }
            }
        }
    }

    /// Insert `content` as a new record with graded importance.
    async fn add_new(
        &self,
        content: &str,
        scope: &Scope,
        mut degradations: Vec<Degradation>,
    ) -> MemoryResult<ConsolidationResult> {
        let embedding = self.inner.embed(content).await?;
        let importance = self.inner.grade(content, &mut degradations).await;
        let record = MemoryRecord::new(content, scope.clone(), embedding);

        let inner = self.inner.clone();
        let memory_id = self
            .commit(async move { inner.commit_insert(record, importance).await })
            .await?;

        Ok(ConsolidationResult {
            event: ConsolidationEvent::Added,
            memory_id,
            degradations,
        })
    }

    /// Replace content in place; `None` if the id was not live at commit.
    async fn replace(&self, id: &MemoryId, content: &str) -> MemoryResult<Option<MemoryRecord>> {
        let embedding = self.inner.embed(content).await?;
        let inner = self.inner.clone();
        let (id, content) = (id.clone(), content.to_string());
        self.commit(async move { inner.commit_replace(id, content, embedding).await })
            .await
    }

    /// Remove a record; `false` if the id was not live at commit.
    async fn remove(&self, id: &MemoryId) -> MemoryResult<bool> {
        let inner = self.inner.clone();
        let id = id.clone();
        self.commit(async move { inner.commit_remove(id).await })
            .await
    }

    // -- direct operations ---------------------------------------------------

    /// Add `content`. With `infer` it is consolidated; without, it is
    /// inserted directly with no extraction or decision.
    #[instrument(skip_all, fields(op = "add", infer = infer))]
    pub async fn add(
        &self,
        content: &str,
        scope: &Scope,
        infer: bool,
    ) -> MemoryResult<ConsolidationResult> {
        if infer {
            self.consolidate(content, scope).await
        } else {
            self.add_new(content, scope, Vec::new()).await
        }
    }

    /// Scoped records closer than `max_distance` to `query`, nearest first.
    pub async fn search(&self, query: &str, scope: &Scope) -> MemoryResult<Vec<ScoredRecord>> {
        let embedding = self.inner.embed(query).await?;
        let hits = self
            .inner
            .stores
            .records
            .search(
                &embedding,
                scope,
                self.inner.config.search_limit,
                self.inner.config.max_distance,
            )
            .await?;
        Ok(hits)
    }

    /// Fetch a live record and count the access.
    #[instrument(skip_all, fields(op = "get", memory_id = %id))]
    pub async fn get(&self, id: &MemoryId) -> MemoryResult<MemoryRecord> {
        let _guard = self.inner.locks.lock(id.as_str()).await;
        let record = self
            .inner
            .stores
            .records
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound { id: id.clone() })?;
        self.inner.stores.metadata.bump_access(id).await?;
        Ok(record)
    }

    /// Live records in `scope`, oldest first.
    pub async fn get_all(&self, scope: &Scope) -> MemoryResult<Vec<MemoryRecord>> {
        Ok(self.inner.stores.records.list(scope).await?)
    }

    /// Replace a live record's content.
    #[instrument(skip_all, fields(op = "update", memory_id = %id))]
    pub async fn update(&self, id: &MemoryId, content: &str) -> MemoryResult<MemoryRecord> {
        self.replace(id, content)
            .await?
            .ok_or_else(|| MemoryError::NotFound { id: id.clone() })
    }

    /// Remove a live record.
    #[instrument(skip_all, fields(op = "delete", memory_id = %id))]
    pub async fn delete(&self, id: &MemoryId) -> MemoryResult<()> {
        if self.remove(id).await? {
            Ok(())
        } else {
            Err(MemoryError::NotFound { id: id.clone() })
        }
    }

    /// Remove every live record in `scope`; returns the removed ids.
    #[instrument(skip_all, fields(op = "delete_all"))]
    pub async fn delete_all(&self, scope: &Scope) -> MemoryResult<Vec<MemoryId>> {
        let mut removed = Vec::new();
        for record in self.inner.stores.records.list(scope).await? {
            if self.remove(&record.id).await? {
                removed.push(record.id);
            }
        }
        info!(removed = removed.len(), "scoped delete finished");
        Ok(removed)
    }

    /// Clear records, metadata and history.
    #[instrument(skip_all, fields(op = "reset"))]
    pub async fn reset(&self) -> MemoryResult<()> {
        self.inner.stores.records.clear().await?;
        self.inner.stores.metadata.clear().await?;
        self.inner.stores.history.clear().await?;
        self.inner.metrics.reset();
        info!(event = "pool.reset");
        Ok(())
    }

    /// Ledger for `id` in mutation order; empty if it never existed.
    pub async fn history(&self, id: &MemoryId) -> MemoryResult<Vec<HistoryEntry>> {
        Ok(self.inner.stores.history.history(id).await?)
    }

    /// Metadata of a live record. Orphaned entries are never returned.
    pub async fn metadata(&self, id: &MemoryId) -> MemoryResult<Option<MetadataEntry>> {
        if self.inner.stores.records.get(id).await?.is_none() {
            return Ok(None);
        }
        Ok(self.inner.stores.metadata.get(id).await?)
    }

    /// Current strength of a live record; zero without metadata.
    pub async fn strength(&self, id: &MemoryId) -> MemoryResult<f64> {
        let entry = self.metadata(id).await?;
        Ok(retention::strength_or_zero(entry.as_ref(), Utc::now()))
    }

    // -- decay ---------------------------------------------------------------

    /// Remove every live record whose strength is strictly below
    /// `threshold`. Per-record failures are collected, never fatal.
    #[instrument(skip_all, fields(op = "decay", threshold = threshold))]
    pub async fn decay(&self, threshold: f64) -> MemoryResult<DecayReport> {
        let snapshot = self.inner.stores.records.list(&Scope::all()).await?;
        let mut report = DecayReport {
            scanned: snapshot.len(),
            ..DecayReport::default()
        };

        for record in snapshot {
            let inner = self.inner.clone();
            let id = record.id.clone();
            let outcome = self
                .commit(async move { inner.commit_decay(id, threshold).await })
                .await;
            match outcome {
                Ok(Some(_)) => report.removed.push(record.id),
                Ok(None) => {}
                Err(e) => report.failed.push(DecayFailure {
                    memory_id: record.id,
                    error: e.to_string(),
                }),
            }
        }

        obs::emit_decay_finished(
            threshold,
            report.scanned,
            report.removed.len(),
            report.failed.len(),
        );
        Ok(report)
    }
}

impl Inner {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        self.caps
            .embedder
            .embed(text)
            .await
            .map_err(MemoryError::EmbeddingUnavailable)
    }

    /// Graded importance, or the configured default with a degradation.
    async fn grade(&self, content: &str, degradations: &mut Vec<Degradation>) -> f64 {
        let reason = match self.caps.importance.score(content).await {
            Ok(Some(value)) if value.is_finite() => return value,
            Ok(Some(value)) => format!("non-finite importance {value}"),
            Ok(None) => "no number in importance response".to_string(),
            Err(e) => e.to_string(),
        };
        let importance = self.config.default_importance;
        obs::emit_importance_defaulted(&reason, importance);
        degradations.push(Degradation::ImportanceDefaulted { reason, importance });
        importance
    }

    /// Append the history entry paired with a committed store mutation.
    async fn append_paired(
        &self,
        id: &MemoryId,
        action: HistoryAction,
        payload: &str,
    ) -> MemoryResult<()> {
        match self.stores.history.append(id, action, payload).await {
            Ok(_) => Ok(()),
            Err(source) => {
                obs::emit_history_append_failed(id, action.as_str(), &source);
                self.metrics.inc_partial_failures();
                Err(MemoryError::PartialFailure {
                    memory_id: id.clone(),
                    action,
                    store_ok: true,
                    history_ok: false,
                    source,
                })
            }
        }
    }

    async fn cleanup_metadata(&self, id: &MemoryId) {
        if !self.config.cleanup_metadata {
            return;
        }
        if let Err(e) = self.stores.metadata.delete(id).await {
            obs::emit_metadata_cleanup_failed(id, &e);
        }
    }

    async fn commit_insert(&self, record: MemoryRecord, importance: f64) -> MemoryResult<MemoryId> {
        let id = record.id.clone();
        let content = record.content.clone();
        let _guard = self.locks.lock(id.as_str()).await;

        self.stores.metadata.set_importance(&id, importance).await?;
        if let Err(e) = self.stores.records.insert(record).await {
            // No record was written; do not leave its metadata behind.
            if let Err(cleanup) = self.stores.metadata.delete(&id).await {
                obs::emit_metadata_cleanup_failed(&id, &cleanup);
            }
            return Err(e.into());
        }
        self.append_paired(&id, HistoryAction::Add, &content).await?;

        obs::emit_memory_added(&id, importance);
        self.metrics.inc_added();
        Ok(id)
    }

    async fn commit_replace(
        &self,
        id: MemoryId,
        content: String,
        embedding: Vec<f32>,
    ) -> MemoryResult<Option<MemoryRecord>> {
        let _guard = self.locks.lock(id.as_str()).await;

        let record = match self
            .stores
            .records
            .replace_content(&id, &content, embedding)
            .await
        {
            Ok(record) => record,
            Err(StorageError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.append_paired(&id, HistoryAction::Update, &content).await?;

        obs::emit_memory_updated(&id);
        self.metrics.inc_updated();
        Ok(Some(record))
    }

    async fn commit_remove(&self, id: MemoryId) -> MemoryResult<bool> {
        let _guard = self.locks.lock(id.as_str()).await;

        if !self.stores.records.delete(&id).await? {
            return Ok(false);
        }
        self.cleanup_metadata(&id).await;
        self.append_paired(&id, HistoryAction::Delete, "").await?;

        obs::emit_memory_deleted(&id);
        self.metrics.inc_deleted();
        Ok(true)
    }

    /// Score under the id lock and remove if below `threshold`; returns the
    /// strength of a removed record.
    async fn commit_decay(&self, id: MemoryId, threshold: f64) -> MemoryResult<Option<f64>> {
        let _guard = self.locks.lock(id.as_str()).await;

        let entry = self.stores.metadata.get(&id).await?;
        let strength = retention::strength_or_zero(entry.as_ref(), Utc::now());
        let below = strength < threshold;
        if !below {
            return Ok(None);
        }
        if !self.stores.records.delete(&id).await? {
            return Ok(None);
        }
        self.cleanup_metadata(&id).await;
        self.append_paired(&id, HistoryAction::Decay, "").await?;

        obs::emit_memory_decayed(&id, strength, threshold);
        self.metrics.inc_decayed();
        Ok(Some(strength))
    }
}
