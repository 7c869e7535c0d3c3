//! Error types for the `finrag-chat` crate.

use finrag_model::ModelError;
use finrag_rag::RagError;
use thiserror::Error;

use crate::transcript::TranscriptError;

/// Errors surfaced while starting the assistant or answering a turn.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Retrieval failed: chunking, embedding, indexing or search.
    #[error(transparent)]
    Rag(#[from] RagError),

    /// The generation backend failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The application configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A legacy transcript string could not be parsed.
    #[error("Malformed transcript: {0}")]
    Transcript(#[from] TranscriptError),

    /// The filing corpus could not be read.
    #[error("Corpus error ({path}): {message}")]
    Corpus {
        /// The file or directory involved.
        path: String,
        /// A description of the failure.
        message: String,
    },
}

impl ChatError {
    /// Whether the underlying backend condition may clear on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rag(e) => e.is_transient(),
            Self::Model(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// A convenience result type for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
