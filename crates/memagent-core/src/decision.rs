//! Consolidation decisions.
//!
//! A [`DecisionMaker`] looks at new content next to the related records
//! already in the pool and returns a structured [`Decision`]. The
//! completion-backed implementation owns the text protocol
//! (`ADD` / `UPDATE:<id>` / `DELETE:<id>`); the engine only ever sees the
//! parsed enum.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use memagent_state::{MemoryId, MemoryRecord};
use serde::{Deserialize, Serialize};

use crate::capability::{CapabilityResult, LanguageModel};

/// What to do with new content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Store the content as a new record.
    Add,
    /// Replace the content of an existing record.
    Update { id: MemoryId },
    /// Retire an existing record as obsolete.
    Delete { id: MemoryId },
    /// The decider answered something that is none of the above.
    Unrecognized { raw: String },
}

impl Decision {
    /// Parse the text protocol.
    ///
    /// Anything that is not exactly `ADD`, `UPDATE:<id>` or `DELETE:<id>`
    /// (after trimming) is `Unrecognized`, including a directive with an
    /// empty id.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if text == "ADD" {
            return Decision::Add;
        }
        let targeted = |prefix: &str| {
            text.strip_prefix(prefix)
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(MemoryId::from)
        };
        if let Some(id) = targeted("UPDATE:") {
            return Decision::Update { id };
        }
        if let Some(id) = targeted("DELETE:") {
            return Decision::Delete { id };
        }
        Decision::Unrecognized {
            raw: raw.to_string(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Add => f.write_str("ADD"),
            Decision::Update { id } => write!(f, "UPDATE:{id}"),
            Decision::Delete { id } => write!(f, "DELETE:{id}"),
            Decision::Unrecognized { raw } => write!(f, "unrecognized({raw})"),
        }
    }
}

/// Resolves new content against related records.
#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn decide(&self, content: &str, related: &[MemoryRecord]) -> CapabilityResult<Decision>;
}

pub fn decision_prompt(content: &str, related: &[MemoryRecord]) -> String {
    let listing = if related.is_empty() {
        "(none)".to_string()
    } else {
        related
            .iter()
            .map(|r| format!("{}: {}", r.id, r.content))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Given the new information: \"{content}\"\n\
         And existing related memories:\n{listing}\n\
         Decide whether to ADD this new information as a new memory, UPDATE an existing memory, \
         or DELETE an existing memory if it's outdated.\n\
         Respond with 'ADD', 'UPDATE:<memory_id>', or 'DELETE:<memory_id>'. \
         If UPDATE, specify the memory_id to update. If DELETE, specify the memory_id to delete.\n\
         Decision:"
    )
}

/// Completion-backed [`DecisionMaker`].
pub struct LlmDecisionMaker {
    model: Arc<dyn LanguageModel>,
}

impl LlmDecisionMaker {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl DecisionMaker for LlmDecisionMaker {
    async fn decide(&self, content: &str, related: &[MemoryRecord]) -> CapabilityResult<Decision> {
        let response = self
            .model
            .complete(&decision_prompt(content, related))
            .await?;
        Ok(Decision::parse(&response))
    }
}
