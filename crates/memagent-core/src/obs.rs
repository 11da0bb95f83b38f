//! Structured observability hooks for memory lifecycle events.
//!
//! This module provides:
//! - Operation-scoped tracing spans, either as a [`tracing::Span`] to
//!   instrument futures with or as the `MemorySpan` RAII guard
//! - Emission functions for record mutations, consolidation fallbacks and
//!   decay sweeps
//!
//! Mutations are emitted at `info!`; recovered anomalies at `warn!`.

use memagent_state::MemoryId;
use tracing::{info, warn};

/// Span tagging every log line of one engine operation.
pub fn operation_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!("memagent.op", op = operation)
}

/// RAII guard that enters an operation span until dropped.
///
/// Not `Send`; use [`operation_span`] with `Instrument` inside spawned
/// futures.
///
/// # Example
///
/// ```ignore
/// let _span = MemorySpan::enter("cli.add");
/// ```
pub struct MemorySpan {
    _span: tracing::span::EnteredSpan,
}

impl MemorySpan {
    pub fn enter(operation: &'static str) -> Self {
        Self {
            _span: operation_span(operation).entered(),
        }
    }
}

pub fn emit_memory_added(id: &MemoryId, importance: f64) {
    info!(event = "memory.added", memory_id = %id, importance = importance);
}

pub fn emit_memory_updated(id: &MemoryId) {
    info!(event = "memory.updated", memory_id = %id);
}

pub fn emit_memory_deleted(id: &MemoryId) {
    info!(event = "memory.deleted", memory_id = %id);
}

pub fn emit_memory_decayed(id: &MemoryId, strength: f64, threshold: f64) {
    info!(
        event = "memory.decayed",
        memory_id = %id,
        strength = strength,
        threshold = threshold,
    );
}

/// Emit event: the decider's answer was unusable, content is added instead.
pub fn emit_decision_fallback(raw: &str) {
    warn!(event = "consolidation.decision_fallback", raw = %raw, fallback = "ADD");
}

/// Emit event: an UPDATE/DELETE directive named an id that is not live.
pub fn emit_target_not_live(id: &MemoryId, directive: &str) {
    warn!(event = "consolidation.target_not_live", memory_id = %id, directive = directive);
}

pub fn emit_extraction_degraded(reason: &dyn std::fmt::Display) {
    warn!(event = "consolidation.extraction_degraded", reason = %reason);
}

pub fn emit_importance_defaulted(reason: &str, importance: f64) {
    warn!(
        event = "consolidation.importance_defaulted",
        reason = %reason,
        importance = importance,
    );
}

/// Emit event: the store mutation committed but its history entry did not.
pub fn emit_history_append_failed(id: &MemoryId, action: &str, error: &dyn std::fmt::Display) {
    tracing::error!(
        event = "history.append_failed",
        memory_id = %id,
        action = action,
        error = %error,
    );
}

pub fn emit_metadata_cleanup_failed(id: &MemoryId, error: &dyn std::fmt::Display) {
    warn!(event = "metadata.cleanup_failed", memory_id = %id, error = %error);
}

pub fn emit_decay_finished(threshold: f64, scanned: usize, removed: usize, failed: usize) {
    info!(
        event = "decay.finished",
        threshold = threshold,
        scanned = scanned,
        removed = removed,
        failed = failed,
    );
}
