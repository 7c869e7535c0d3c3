//! Selection of a generation backend from its configured identifier.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ModelError, Result};
use crate::mock::MockModel;
use crate::model::LanguageModel;

/// A parsed `generation_backend_identifier`.
///
/// | Identifier            | Backend                                    |
/// |-----------------------|--------------------------------------------|
/// | `openai:<model>`      | OpenAI chat completions (hosted)           |
/// | `ollama:<model>`      | Ollama daemon (locally-run model)          |
/// | `mock:<answer>`       | Fixed answer, no network                   |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelBackend {
    /// Hosted OpenAI model.
    OpenAI {
        /// Model name, e.g. `gpt-3.5-turbo`.
        model: String,
    },
    /// Model served by a local Ollama daemon.
    Ollama {
        /// Model name, e.g. `llama2`.
        model: String,
    },
    /// Offline stand-in returning a fixed answer.
    Mock {
        /// The answer returned for every prompt.
        answer: String,
    },
}

impl FromStr for ModelBackend {
    type Err = ModelError;

    fn from_str(identifier: &str) -> Result<Self> {
        let (kind, rest) = identifier.split_once(':').ok_or_else(|| {
            ModelError::ConfigError(format!(
                "backend identifier '{identifier}' must look like '<kind>:<model>'"
            ))
        })?;
        let non_empty = |what: &str| {
            if rest.trim().is_empty() {
                Err(ModelError::ConfigError(format!("{what} missing in '{identifier}'")))
            } else {
                Ok(rest.trim().to_string())
            }
        };
        match kind.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI { model: non_empty("model name")? }),
            "ollama" => Ok(Self::Ollama { model: non_empty("model name")? }),
            "mock" => Ok(Self::Mock { answer: rest.to_string() }),
            other => Err(ModelError::ConfigError(format!("unknown generation backend '{other}'"))),
        }
    }
}

impl fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAI { model } => write!(f, "openai:{model}"),
            Self::Ollama { model } => write!(f, "ollama:{model}"),
            Self::Mock { answer } => write!(f, "mock:{answer}"),
        }
    }
}

/// Connection settings shared by the network backends.
#[derive(Debug, Clone, Default)]
pub struct BackendSettings {
    /// OpenAI API key; falls back to `OPENAI_API_KEY` when `None`.
    pub openai_api_key: Option<String>,
    /// Override for the OpenAI base URL.
    pub openai_base_url: Option<String>,
    /// Address of the Ollama daemon.
    pub ollama_url: Option<String>,
}

impl ModelBackend {
    /// Construct the client for this backend.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ConfigError`] if credentials are missing or the
    /// backend was compiled out.
    pub fn connect(&self, settings: &BackendSettings) -> Result<Arc<dyn LanguageModel>> {
        match self {
            Self::Mock { answer } => Ok(Arc::new(MockModel::new(answer.clone()))),
            #[cfg(feature = "openai")]
            Self::OpenAI { model } => {
                use crate::openai::{OpenAIChatModel, OpenAIConfig};
                let mut config = match &settings.openai_api_key {
                    Some(key) => OpenAIConfig::new(key.clone(), model.clone()),
                    None => OpenAIConfig::from_env(model.clone())?,
                };
                if let Some(base_url) = &settings.openai_base_url {
                    config = config.with_base_url(base_url.clone());
                }
                Ok(Arc::new(OpenAIChatModel::new(config)?))
            }
            #[cfg(feature = "ollama")]
            Self::Ollama { model } => {
                use crate::ollama::{DEFAULT_OLLAMA_URL, OllamaModel};
                let url = settings.ollama_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
                Ok(Arc::new(OllamaModel::new(url, model.clone())?))
            }
            #[allow(unreachable_patterns)]
            other => Err(ModelError::ConfigError(format!(
                "backend '{other}' is not compiled into this build"
            ))),
        }
    }
}
