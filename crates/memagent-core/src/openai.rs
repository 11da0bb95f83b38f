//! OpenAI-compatible HTTP capability adapter.
//!
//! Implements [`Embedder`] over `POST {base_url}/embeddings` and
//! [`LanguageModel`] over `POST {base_url}/chat/completions`. Works with any
//! API that speaks the same protocol (Azure OpenAI, vLLM, LiteLLM) via
//! `OPENAI_BASE_URL`.
//!
//! Transport failures and non-success statuses are `Unavailable`; bodies
//! that do not have the expected shape are `InvalidResponse`. The request
//! timeout is the only bound; nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::{CapabilityResult, Embedder, LanguageModel};
use crate::error::{CapabilityError, MemoryError, MemoryResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - OPENAI_API_KEY (required)
    /// - OPENAI_BASE_URL (optional, default: "https://api.openai.com/v1")
    /// - MEMAGENT_CHAT_MODEL (optional, default: "gpt-4o-mini")
    /// - MEMAGENT_EMBEDDING_MODEL (optional, default: "text-embedding-ada-002")
    /// - MEMAGENT_HTTP_TIMEOUT_SECS (optional, default: 30)
    pub fn from_env() -> MemoryResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| MemoryError::Config("OPENAI_API_KEY not set".into()))?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("MEMAGENT_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Ok(model) = std::env::var("MEMAGENT_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Ok(raw) = std::env::var("MEMAGENT_HTTP_TIMEOUT_SECS") {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                MemoryError::Config(format!("MEMAGENT_HTTP_TIMEOUT_SECS: cannot parse {raw:?}"))
            })?;
        }
        Ok(config)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

fn embedding_from(body: EmbeddingResponse) -> CapabilityResult<Vec<f32>> {
    body.data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CapabilityError::InvalidResponse("no embedding in response".into()))
}

fn completion_from(body: ChatResponse) -> CapabilityResult<String> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| CapabilityError::InvalidResponse("no completion in response".into()))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for one OpenAI-compatible endpoint.
pub struct OpenAiClient {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> MemoryResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("memagent/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemoryError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> MemoryResult<Self> {
        Self::new(OpenAiConfig::from_env()?)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> CapabilityResult<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = self.config.endpoint(path);
        debug!(url = %url, "capability request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("{path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(CapabilityError::Unavailable(format!(
                "{path}: HTTP {status}: {message}"
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| CapabilityError::InvalidResponse(format!("{path}: {e}")))
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };
        let body: EmbeddingResponse = self.post("embeddings", &request).await?;
        embedding_from(body)
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(&self, prompt: &str) -> CapabilityResult<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let body: ChatResponse = self.post("chat/completions", &request).await?;
        completion_from(body)
    }
}
