//! Embedding provider for models served by a local Ollama daemon.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Default address of a local Ollama daemon.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// An [`EmbeddingProvider`] backed by Ollama's `/api/embed` endpoint.
///
/// Ollama does not report a model's output size up front, so
/// [`connect`](OllamaEmbeddingProvider::connect) embeds a probe string once
/// to learn it.
///
/// # Example
///
/// ```rust,ignore
/// use finrag_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::connect("http://localhost:11434", "nomic-embed-text").await?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingProvider {
    /// Connect to the daemon at `base_url` and probe the model's dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the daemon is unreachable or
    /// the model is not available.
    pub async fn connect(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let mut provider = Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions: 0,
        };

        let probe = provider.request(&["dimension probe"]).await?;
        provider.dimensions = probe.first().map(Vec::len).unwrap_or_default();
        if provider.dimensions == 0 {
            return Err(provider.backend_error("model returned an empty embedding".into()));
        }

        info!(model = %provider.model, dimensions = provider.dimensions, "connected to Ollama embedder");
        Ok(provider)
    }

    fn backend_error(&self, message: String) -> RagError {
        RagError::EmbeddingError { provider: format!("Ollama/{}", self.model), message }
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest { model: &self.model, input: texts.to_vec() };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "Ollama", error = %e, "request failed");
                self.backend_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            error!(provider = "Ollama", %status, "API error");
            return Err(self.backend_error(format!("API returned {status}: {detail}")));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = "Ollama", error = %e, "failed to parse response");
            self.backend_error(format!("failed to parse response: {e}"))
        })?;

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.backend_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "Ollama", batch_size = texts.len(), model = %self.model, "embedding batch");
        self.request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> String {
        format!("ollama:{}", self.model)
    }
}
