//! Atomic counters for one memory engine.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI command).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lightweight atomic counters with no allocations, no locking.
#[derive(Debug, Default)]
pub struct Metrics {
    added: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    decayed: AtomicU64,
    decision_fallbacks: AtomicU64,
    partial_failures: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
    pub decayed: u64,
    pub decision_fallbacks: u64,
    pub partial_failures: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            added: AtomicU64::new(0),
            updated: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
            decayed: AtomicU64::new(0),
            decision_fallbacks: AtomicU64::new(0),
            partial_failures: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    pub fn inc_added(&self) {
        Self::bump(&self.added, "added");
    }

    pub fn inc_updated(&self) {
        Self::bump(&self.updated, "updated");
    }

    pub fn inc_deleted(&self) {
        Self::bump(&self.deleted, "deleted");
    }

    pub fn inc_decayed(&self) {
        Self::bump(&self.decayed, "decayed");
    }

    pub fn inc_decision_fallbacks(&self) {
        Self::bump(&self.decision_fallbacks, "decision_fallbacks");
    }

    pub fn inc_partial_failures(&self) {
        Self::bump(&self.partial_failures, "partial_failures");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            added: self.added.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            decayed: self.decayed.load(Ordering::Relaxed),
            decision_fallbacks: self.decision_fallbacks.load(Ordering::Relaxed),
            partial_failures: self.partial_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries rather than on every increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            added = s.added,
            updated = s.updated,
            deleted = s.deleted,
            decayed = s.decayed,
            decision_fallbacks = s.decision_fallbacks,
            partial_failures = s.partial_failures,
        );
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.added,
            &self.updated,
            &self.deleted,
            &self.decayed,
            &self.decision_fallbacks,
            &self.partial_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
