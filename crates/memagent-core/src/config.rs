//! Engine configuration.
//!
//! Defaults match the reference behaviour: ten related results per fact,
//! cosine distance cutoff 0.8, neutral importance 0.5.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};

/// Tunables for a [`crate::MemoryEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Related records fetched per extracted fact (and per search).
    pub search_limit: usize,
    /// Records at or beyond this cosine distance are not "related".
    pub max_distance: f32,
    /// Importance used when grading fails or yields no number.
    pub default_importance: f64,
    /// Threshold used by callers that do not pass one to `decay`.
    pub decay_threshold: f64,
    /// Delete metadata alongside every record removal.
    pub cleanup_metadata: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_limit: 10,
            max_distance: 0.8,
            default_importance: 0.5,
            decay_threshold: 0.5,
            cleanup_metadata: true,
        }
    }
}

fn env_override<T: FromStr>(name: &str, target: &mut T) -> MemoryResult<()> {
    if let Ok(raw) = std::env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| MemoryError::Config(format!("{name}: cannot parse {raw:?}")))?;
    }
    Ok(())
}

impl EngineConfig {
    /// Create from environment variables
    ///
    /// Reads (all optional):
    /// - MEMAGENT_SEARCH_LIMIT
    /// - MEMAGENT_MAX_DISTANCE
    /// - MEMAGENT_DEFAULT_IMPORTANCE
    /// - MEMAGENT_DECAY_THRESHOLD
    /// - MEMAGENT_CLEANUP_METADATA ("true" / "false")
    pub fn from_env() -> MemoryResult<Self> {
        let mut config = Self::default();
        env_override("MEMAGENT_SEARCH_LIMIT", &mut config.search_limit)?;
        env_override("MEMAGENT_MAX_DISTANCE", &mut config.max_distance)?;
        env_override("MEMAGENT_DEFAULT_IMPORTANCE", &mut config.default_importance)?;
        env_override("MEMAGENT_DECAY_THRESHOLD", &mut config.decay_threshold)?;
        env_override("MEMAGENT_CLEANUP_METADATA", &mut config.cleanup_metadata)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> MemoryResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| MemoryError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.search_limit == 0 {
            return Err(MemoryError::Config("search_limit must be at least 1".into()));
        }
        if self.max_distance.is_nan() || self.max_distance <= 0.0 {
            return Err(MemoryError::Config("max_distance must be positive".into()));
        }
        if !self.default_importance.is_finite() {
            return Err(MemoryError::Config("default_importance must be finite".into()));
        }
        if self.decay_threshold.is_nan() {
            return Err(MemoryError::Config("decay_threshold must be a number".into()));
        }
        Ok(())
    }
}
