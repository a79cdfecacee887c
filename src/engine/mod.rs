//! Answer engine boundary.
//!
//! The orchestration layer treats answering as an opaque async call:
//! question in, answer (or failure) out. The production implementation
//! talks to an OpenAI-compatible chat-completions endpoint; tests swap
//! in scripted engines through the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("engine returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("engine returned no completion")]
    EmptyCompletion,

    #[error("engine is not configured: {0}")]
    NotConfigured(String),
}

/// What the engine produced for one query: the answer plus the ids of
/// whatever documents it grounded the answer on (may be empty).
#[derive(Debug, Clone)]
pub struct EngineAnswer {
    pub answer_text: String,
    pub sources: Vec<String>,
}

#[async_trait]
pub trait AnswerEngine: Send + Sync {
    async fn answer(&self, query_text: &str) -> Result<EngineAnswer, EngineError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct HttpAnswerEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: Option<u32>,
}

impl HttpAnswerEngine {
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        if config.api_base_url.is_empty() {
            return Err(EngineError::NotConfigured(
                "engine.api_base_url is empty".to_string(),
            ));
        }

        let api_key = config.resolve_api_key().ok_or_else(|| {
            EngineError::NotConfigured(
                "no API key: set engine.api_key or OPENAI_API_KEY".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.request_timeout_seconds,
            ))
            .user_agent("Ragarr/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl AnswerEngine for HttpAnswerEngine {
    async fn answer(&self, query_text: &str) -> Result<EngineAnswer, EngineError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: query_text.to_string(),
            }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .map_or_else(|| status.to_string(), |d| d.message);
            return Err(EngineError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response.json().await?;
        let answer_text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(EngineError::EmptyCompletion)?;

        // Document attribution is owned by the retrieval side of the
        // endpoint; a plain completion backend cites nothing.
        Ok(EngineAnswer {
            answer_text,
            sources: Vec::new(),
        })
    }
}
