//! Selection of an embedding backend from its configured identifier.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::embedding::{EmbeddingProvider, HashEmbeddingProvider};
use crate::error::{RagError, Result};

/// A parsed `embedding_model_identifier`.
///
/// | Identifier        | Backend                                  |
/// |-------------------|------------------------------------------|
/// | `hash:<dims>`     | [`HashEmbeddingProvider`], offline       |
/// | `openai:<model>`  | OpenAI embeddings API                    |
/// | `ollama:<model>`  | Ollama daemon (locally-run model)        |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing.
    Hash {
        /// Output dimensionality.
        dimensions: usize,
    },
    /// Hosted OpenAI embeddings.
    OpenAI {
        /// Model name, e.g. `text-embedding-3-small`.
        model: String,
    },
    /// Embeddings from a local Ollama daemon.
    Ollama {
        /// Model name, e.g. `nomic-embed-text`.
        model: String,
    },
}

impl FromStr for EmbeddingBackend {
    type Err = RagError;

    fn from_str(identifier: &str) -> Result<Self> {
        let (kind, rest) = identifier.split_once(':').ok_or_else(|| {
            RagError::ConfigError(format!(
                "embedding identifier '{identifier}' must look like '<kind>:<model>'"
            ))
        })?;
        let rest = rest.trim();
        if rest.is_empty() {
            return Err(RagError::ConfigError(format!("model missing in '{identifier}'")));
        }
        match kind.trim().to_ascii_lowercase().as_str() {
            "hash" => {
                let dimensions = rest.parse::<usize>().ok().filter(|d| *d > 0).ok_or_else(|| {
                    RagError::ConfigError(format!("'{rest}' is not a positive dimension count"))
                })?;
                Ok(Self::Hash { dimensions })
            }
            "openai" => Ok(Self::OpenAI { model: rest.to_string() }),
            "ollama" => Ok(Self::Ollama { model: rest.to_string() }),
            other => Err(RagError::ConfigError(format!("unknown embedding backend '{other}'"))),
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash { dimensions } => write!(f, "hash:{dimensions}"),
            Self::OpenAI { model } => write!(f, "openai:{model}"),
            Self::Ollama { model } => write!(f, "ollama:{model}"),
        }
    }
}

/// Connection settings shared by the network embedders.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingSettings {
    /// OpenAI API key; falls back to `OPENAI_API_KEY` when `None`.
    pub openai_api_key: Option<String>,
    /// Override for the OpenAI base URL.
    pub openai_base_url: Option<String>,
    /// Address of the Ollama daemon.
    pub ollama_url: Option<String>,
}

impl EmbeddingBackend {
    /// Construct the provider for this backend.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if credentials are missing or the backend
    ///   was compiled out
    /// - [`RagError::EmbeddingError`] if a local daemon cannot be reached
    pub async fn connect(&self, settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
        match self {
            Self::Hash { dimensions } => Ok(Arc::new(HashEmbeddingProvider::new(*dimensions))),
            #[cfg(feature = "openai")]
            Self::OpenAI { model } => {
                use crate::openai::OpenAIEmbeddingProvider;
                let provider = match &settings.openai_api_key {
                    Some(key) => OpenAIEmbeddingProvider::new(key.clone())?,
                    None => OpenAIEmbeddingProvider::from_env()?,
                };
                let mut provider = provider.with_model(model.clone());
                if let Some(base_url) = &settings.openai_base_url {
                    provider = provider.with_base_url(base_url.clone());
                }
                Ok(Arc::new(provider))
            }
            #[cfg(feature = "ollama")]
            Self::Ollama { model } => {
                use crate::ollama::{DEFAULT_OLLAMA_URL, OllamaEmbeddingProvider};
                let url = settings.ollama_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
                Ok(Arc::new(OllamaEmbeddingProvider::connect(url, model.clone()).await?))
            }
            #[allow(unreachable_patterns)]
            other => Err(RagError::ConfigError(format!(
                "embedding backend '{other}' is not compiled into this build"
            ))),
        }
    }
}
