//! Strength scoring and the decay sweep report.

use chrono::{DateTime, Utc};
use memagent_state::{MemoryId, MetadataEntry};
use serde::{Deserialize, Serialize};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Hours between `last_accessed_at` and `now`, clamped at zero.
pub fn recency_hours(last_accessed_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed_ms = (now - last_accessed_at).num_milliseconds().max(0);
    elapsed_ms as f64 / MILLIS_PER_HOUR
}

/// `importance * (1 + access_count) / (1 + recency_hours)`.
///
/// Decreasing in recency, increasing in access count and (non-negative)
/// importance, and exactly zero when importance is zero.
pub fn strength(entry: &MetadataEntry, now: DateTime<Utc>) -> f64 {
    let recency = recency_hours(entry.last_accessed_at, now);
    entry.importance * (1.0 + entry.access_count as f64) / (1.0 + recency)
}

/// Strength of an optional entry; absent metadata scores zero.
pub fn strength_or_zero(entry: Option<&MetadataEntry>, now: DateTime<Utc>) -> f64 {
    entry.map(|e| strength(e, now)).unwrap_or(0.0)
}

/// One record the sweep could not fully retire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecayFailure {
    pub memory_id: MemoryId,
    pub error: String,
}

/// Outcome of a decay sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecayReport {
    /// Records removed with their DECAY entry written.
    pub removed: Vec<MemoryId>,
    /// Records whose scoring, removal or history append failed.
    pub failed: Vec<DecayFailure>,
    /// Live records examined.
    pub scanned: usize,
}
