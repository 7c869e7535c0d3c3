//! Query-time retrieval: embed the query, then search the index.

use std::sync::Arc;

use tracing::debug;

use crate::document::SearchResult;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;

/// Retrieves the chunks most relevant to a query.
///
/// A `Retriever` pairs an [`EmbeddingProvider`] with a [`VectorIndex`] built
/// by the same model. It holds no mutable state, so a single instance can be
/// shared by every session.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("model_id", &self.index.model_id())
            .field("entries", &self.index.len())
            .finish()
    }
}

impl Retriever {
    /// Pair an embedder with an index.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the embedder is not the model the
    /// index was built with.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Result<Self> {
        let model_id = embedder.model_id();
        if model_id != index.model_id() || embedder.dimensions() != index.dimensions() {
            return Err(RagError::ConfigError(format!(
                "embedder {model_id} ({} dims) cannot query an index built with {} ({} dims)",
                embedder.dimensions(),
                index.model_id(),
                index.dimensions()
            )));
        }
        Ok(Self { embedder, index })
    }

    /// The index being searched.
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    /// Return up to `k` chunks ranked by similarity to `query`.
    ///
    /// Errors from the embedder or the index are returned unchanged.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed(query).await?;
        let results = self.index.search(&query_embedding, k).await?;
        debug!(k, result_count = results.len(), "retrieved context");
        Ok(results)
    }
}
