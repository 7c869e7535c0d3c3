//! OpenAI chat completions backend.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{ModelError, Result};
use crate::http::{classify_transport, error_from_response};
use crate::model::LanguageModel;

/// The default OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Configuration for [`OpenAIChatModel`].
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Model name, e.g. `gpt-3.5-turbo`.
    pub model: String,
    /// Base URL; override for OpenAI-compatible servers.
    pub base_url: String,
    /// Sampling temperature. Zero keeps answers reproducible.
    pub temperature: f32,
    /// Optional cap on generated tokens.
    pub max_tokens: Option<u32>,
}

impl OpenAIConfig {
    /// Create a config for the hosted API.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: OPENAI_API_BASE.to_string(),
            temperature: 0.0,
            max_tokens: None,
        }
    }

    /// Read the API key from `OPENAI_API_KEY`.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ModelError::ConfigError("OPENAI_API_KEY environment variable not set".into())
        })?;
        Ok(Self::new(api_key, model))
    }

    /// Point the client at an OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Cap the number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A [`LanguageModel`] backed by the OpenAI chat completions API.
///
/// The prompt is sent as a single user message.
///
/// # Example
///
/// ```rust,ignore
/// use finrag_model::openai::{OpenAIChatModel, OpenAIConfig};
///
/// let model = OpenAIChatModel::new(OpenAIConfig::from_env("gpt-3.5-turbo")?)?;
/// let answer = model.generate("What was total revenue?").await?;
/// ```
pub struct OpenAIChatModel {
    client: reqwest::Client,
    config: OpenAIConfig,
    name: String,
}

impl OpenAIChatModel {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ConfigError`] if the API key or model is empty.
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(ModelError::ConfigError("OpenAI API key must not be empty".into()));
        }
        if config.model.is_empty() {
            return Err(ModelError::ConfigError("OpenAI model name must not be empty".into()));
        }
        let name = format!("openai:{}", config.model);
        Ok(Self { client: reqwest::Client::new(), config, name })
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body).ok().map(|e| e.error.message)
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.name, prompt_len = prompt.len(), "sending chat completion");

        let body = ChatRequest {
            model: &self.config.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(model = %self.name, error = %e, "request failed");
                classify_transport(&self.name, &e)
            })?;

        if !response.status().is_success() {
            let err = error_from_response(&self.name, response, error_detail).await;
            error!(model = %self.name, error = %err, "API error");
            return Err(err);
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(model = %self.name, error = %e, "failed to parse response");
            ModelError::BackendUnavailable {
                backend: self.name.clone(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| ModelError::BackendUnavailable {
                backend: self.name.clone(),
                message: "response contained no message content".into(),
            })
    }
}
