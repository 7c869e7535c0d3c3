//! Error types for the `finrag-rag` crate.

use thiserror::Error;

/// Errors that can occur while chunking, embedding, indexing or searching.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid configuration detected at startup. Never recoverable.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The vector index could not be built. Aborts startup.
    #[error("Index build error: {0}")]
    IndexBuildError(String),

    /// The embedding backend failed to produce vectors.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A caller passed an argument outside the accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A vector's dimensionality does not match the index.
    #[error("Dimension mismatch: index has {expected} dimensions, got {actual}")]
    DimensionMismatch {
        /// Dimensionality fixed when the index was built.
        expected: usize,
        /// Dimensionality of the offending vector.
        actual: usize,
    },

    /// Reading or writing the on-disk index failed.
    #[error("Index persistence error ({path}): {message}")]
    PersistenceError {
        /// The index file involved.
        path: String,
        /// A description of the failure.
        message: String,
    },
}

impl RagError {
    /// Whether the error originates from a transient backend condition.
    ///
    /// Only embedding backend failures qualify; everything else is either a
    /// configuration problem or a caller bug.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::EmbeddingError { .. })
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
