//! Fact extraction and importance grading.
//!
//! Both are completion-backed by default. Parsing is deliberately lenient:
//! anything the engine cannot use falls back to a documented default
//! instead of failing the operation.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::capability::{CapabilityResult, LanguageModel};

/// Splits content into atomic fact strings.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    /// Facts found in `content`; an empty list means "nothing to compare".
    async fn extract_facts(&self, content: &str) -> CapabilityResult<Vec<String>>;
}

/// Grades how important a piece of content is.
#[async_trait]
pub trait ImportanceScorer: Send + Sync {
    /// `Ok(None)` when the grader answered without a usable number.
    async fn score(&self, content: &str) -> CapabilityResult<Option<f64>>;
}

pub fn fact_extraction_prompt(content: &str) -> String {
    format!(
        "Extract key facts from the following text. Return them as a comma-separated list.\n\
         Text: {content}\n\
         Facts:"
    )
}

pub fn importance_prompt(content: &str) -> String {
    format!(
        "Rate the importance of this memory on a scale from 0 to 1.\n\
         Memory: {content}\n\
         Importance:"
    )
}

/// Split a comma-separated completion into trimmed, non-empty facts.
pub fn parse_facts(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|fact| !fact.is_empty())
        .map(str::to_string)
        .collect()
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d+\.?\d*").ok())
        .as_ref()
}

/// First non-negative decimal number in `text`, if any.
pub fn parse_importance(text: &str) -> Option<f64> {
    number_pattern()?
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Completion-backed [`FactExtractor`].
pub struct LlmFactExtractor {
    model: Arc<dyn LanguageModel>,
}

impl LlmFactExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl FactExtractor for LlmFactExtractor {
    async fn extract_facts(&self, content: &str) -> CapabilityResult<Vec<String>> {
        let response = self.model.complete(&fact_extraction_prompt(content)).await?;
        Ok(parse_facts(&response))
    }
}

/// Completion-backed [`ImportanceScorer`].
pub struct LlmImportanceScorer {
    model: Arc<dyn LanguageModel>,
}

impl LlmImportanceScorer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl ImportanceScorer for LlmImportanceScorer {
    async fn score(&self, content: &str) -> CapabilityResult<Option<f64>> {
        let response = self.model.complete(&importance_prompt(content)).await?;
        Ok(parse_importance(response.trim()))
    }
}
