//! Backend for models run locally by an Ollama daemon.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{ModelError, Result};
use crate::http::{classify_transport, error_from_response};
use crate::model::LanguageModel;

/// Default address of a local Ollama daemon.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// A [`LanguageModel`] that calls Ollama's non-streaming `/api/generate`.
///
/// # Example
///
/// ```rust,ignore
/// use finrag_model::ollama::OllamaModel;
///
/// let model = OllamaModel::new("http://localhost:11434", "llama2")?;
/// let answer = model.generate("What was total revenue?").await?;
/// ```
pub struct OllamaModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    name: String,
}

impl OllamaModel {
    /// Create a client for `model` served at `base_url`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if model.is_empty() {
            return Err(ModelError::ConfigError("Ollama model name must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            name: format!("ollama:{model}"),
            model,
        })
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorResponse>(body).ok().map(|e| e.error)
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.name, prompt_len = prompt.len(), "sending generate request");

        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature: 0.0 },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
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

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!(model = %self.name, error = %e, "failed to parse response");
            ModelError::BackendUnavailable {
                backend: self.name.clone(),
                message: format!("failed to parse response: {e}"),
            }
        })?;

        Ok(parsed.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_and_names_model() {
        let model = OllamaModel::new("http://localhost:11434/", "llama2").unwrap();
        assert_eq!(model.base_url, "http://localhost:11434");
        assert_eq!(model.name(), "ollama:llama2");
    }

    #[test]
    fn extracts_daemon_error() {
        assert_eq!(
            error_detail(r#"{"error":"model 'llama9' not found"}"#).as_deref(),
            Some("model 'llama9' not found")
        );
    }
}
