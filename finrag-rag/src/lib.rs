//! # finrag-rag
//!
//! Retrieval half of the finrag filing assistant.
//!
//! ## Overview
//!
//! - [`FixedSizeChunker`] - overlapping fixed-size character windows
//! - [`EmbeddingProvider`] - text to vector, with OpenAI, Ollama and
//!   deterministic hash backends
//! - [`FlatIndex`] / [`VectorIndex`] - exact cosine-similarity search,
//!   optionally persisted to disk with an [`IndexManifest`]
//! - [`Retriever`] - embeds a query and searches the index
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use finrag_rag::{Document, FixedSizeChunker, FlatIndex, HashEmbeddingProvider, Retriever};
//!
//! let chunker = FixedSizeChunker::new(500, 300)?;
//! let doc = Document::new("tsla-10q.txt", text).with_page(1);
//! let embedder = Arc::new(HashEmbeddingProvider::new(384));
//! let index = FlatIndex::build(chunker.split(&doc).collect(), embedder.as_ref(), 64).await?;
//! let retriever = Retriever::new(embedder, Arc::new(index))?;
//! let results = retriever.retrieve("total revenues", 4).await?;
//! ```

pub mod backend;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod index;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
pub mod retriever;

pub use backend::{EmbeddingBackend, EmbeddingSettings};
pub use chunking::{Chunker, Chunks, FixedSizeChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, SearchResult};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{RagError, Result};
pub use index::{FlatIndex, IndexEntry, IndexManifest, VectorIndex};
#[cfg(feature = "ollama")]
pub use ollama::OllamaEmbeddingProvider;
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
pub use retriever::Retriever;
