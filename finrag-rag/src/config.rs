//! Configuration for chunking and retrieval.

use serde::{Deserialize, Serialize};

use crate::chunking::FixedSizeChunker;
use crate::error::{RagError, Result};

/// Retrieval parameters, read once at startup.
///
/// Changing `chunk_size` or `chunk_overlap` invalidates a stored index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per query.
    pub top_k: usize,
    /// Number of chunks sent to the embedder per request while indexing.
    pub embed_batch_size: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { chunk_size: 500, chunk_overlap: 300, top_k: 4, embed_batch_size: 64 }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `embed_batch_size == 0`
    pub fn validate(&self) -> Result<()> {
        FixedSizeChunker::new(self.chunk_size, self.chunk_overlap)?;
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::ConfigError(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The chunker described by this configuration.
    pub fn chunker(&self) -> Result<FixedSizeChunker> {
        FixedSizeChunker::new(self.chunk_size, self.chunk_overlap)
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the number of chunks retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the indexing batch size.
    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.embed_batch_size = size;
        self
    }

    /// Build the [`RagConfig`], validating it.
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_filing_corpus_settings() {
        let config = RagConfig::default();
        assert_eq!((config.chunk_size, config.chunk_overlap), (500, 300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_rejects_inconsistent_values() {
        assert!(RagConfig::builder().chunk_size(100).chunk_overlap(100).build().is_err());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().embed_batch_size(0).build().is_err());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: RagConfig = serde_json::from_str(r#"{"top_k": 8}"#).unwrap();
        assert_eq!(config.top_k, 8);
        assert_eq!(config.chunk_size, 500);
    }
}
