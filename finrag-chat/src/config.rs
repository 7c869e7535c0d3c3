//! Application configuration, read once at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use finrag_model::{BackendSettings, ModelBackend, RetryPolicy};
use finrag_rag::{EmbeddingBackend, EmbeddingSettings, RagConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::prompt::{DEFAULT_INSTRUCTION, DEFAULT_TEMPLATE, PromptComposer};

/// Default embedding backend: offline feature hashing.
pub const DEFAULT_EMBEDDING_MODEL: &str = "hash:384";

/// Default generation backend.
pub const DEFAULT_GENERATION_BACKEND: &str = "openai:gpt-3.5-turbo";

/// Everything needed to start a [`ChatEngine`](crate::ChatEngine).
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```json
/// {
///   "corpus_dir": "filings",
///   "rag": { "top_k": 6 },
///   "generation_backend_identifier": "ollama:llama2"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the extracted filing text.
    pub corpus_dir: PathBuf,
    /// Where the vector index is persisted. `None` keeps it in memory only.
    pub index_path: Option<PathBuf>,
    /// Chunking and retrieval parameters.
    pub rag: RagConfig,
    /// Embedding backend, e.g. `hash:384` or `openai:text-embedding-3-small`.
    pub embedding_model_identifier: String,
    /// Generation backend, e.g. `openai:gpt-3.5-turbo` or `ollama:llama2`.
    pub generation_backend_identifier: String,
    /// Prompt template; see [`crate::prompt`] for placeholders.
    pub instruction_template: String,
    /// Instruction substituted for `{instruction}`.
    pub instruction: String,
    /// Prior turns rendered into `{history}`.
    pub max_history_turns: usize,
    /// Upper bound on a single generation call.
    pub generation_timeout_secs: Option<u64>,
    /// Retry policy for transient generation failures.
    pub retry: RetryPolicy,
    /// Address of the Ollama daemon.
    pub ollama_url: String,
    /// Override for the OpenAI API base URL.
    pub openai_base_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            corpus_dir: PathBuf::from("corpus"),
            index_path: Some(PathBuf::from("finrag_index.json")),
            rag: RagConfig::default(),
            embedding_model_identifier: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_backend_identifier: DEFAULT_GENERATION_BACKEND.to_string(),
            instruction_template: DEFAULT_TEMPLATE.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            max_history_turns: 0,
            generation_timeout_secs: None,
            retry: RetryPolicy::default(),
            ollama_url: "http://localhost:11434".to_string(),
            openai_base_url: None,
        }
    }
}

impl AppConfig {
    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ChatError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Check every setting that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        self.rag.validate()?;
        self.embedding_backend()?;
        self.model_backend()?;
        self.composer()?;
        if self.generation_timeout_secs == Some(0) {
            return Err(ChatError::Config("generation_timeout_secs must be greater than zero".into()));
        }
        Ok(())
    }

    /// The parsed embedding backend.
    pub fn embedding_backend(&self) -> Result<EmbeddingBackend> {
        Ok(self.embedding_model_identifier.parse()?)
    }

    /// The parsed generation backend.
    pub fn model_backend(&self) -> Result<ModelBackend> {
        Ok(self.generation_backend_identifier.parse()?)
    }

    /// The prompt composer described by the template settings.
    pub fn composer(&self) -> Result<PromptComposer> {
        Ok(PromptComposer::new(&self.instruction_template, self.instruction.clone())?
            .with_max_history_turns(self.max_history_turns))
    }

    /// The generation timeout, if one is set.
    pub fn generation_timeout(&self) -> Option<Duration> {
        self.generation_timeout_secs.map(Duration::from_secs)
    }

    /// Connection settings for the embedding backends.
    pub fn embedding_settings(&self) -> EmbeddingSettings {
        EmbeddingSettings {
            openai_api_key: None,
            openai_base_url: self.openai_base_url.clone(),
            ollama_url: Some(self.ollama_url.clone()),
        }
    }

    /// Connection settings for the generation backends.
    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            openai_api_key: None,
            openai_base_url: self.openai_base_url.clone(),
            ollama_url: Some(self.ollama_url.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rag.chunk_size, 500);
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("finrag.json");
        fs::write(
            &path,
            r#"{"corpus_dir": "filings", "rag": {"top_k": 6}, "generation_backend_identifier": "mock:X"}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.corpus_dir, PathBuf::from("filings"));
        assert_eq!(config.rag.top_k, 6);
        assert_eq!(config.rag.chunk_overlap, 300);
        assert_eq!(config.model_backend().unwrap(), ModelBackend::Mock { answer: "X".into() });
    }

    #[test]
    fn invalid_settings_fail_validation() {
        let mut config = AppConfig::default();
        config.rag.chunk_overlap = 500;
        assert!(matches!(config.validate(), Err(ChatError::Rag(_))));

        let config = AppConfig { instruction_template: "{question}".into(), ..AppConfig::default() };
        assert!(matches!(config.validate(), Err(ChatError::Config(_))));

        let config = AppConfig { generation_backend_identifier: "gpt".into(), ..AppConfig::default() };
        assert!(matches!(config.validate(), Err(ChatError::Model(_))));

        let config = AppConfig { generation_timeout_secs: Some(0), ..AppConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("finrag.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(ChatError::Config(_))));
        assert!(matches!(AppConfig::load(temp.path().join("missing.json")), Err(ChatError::Config(_))));
    }
}
