//! Data types for documents, chunks, and search results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A source document: the extracted text of one page of a filing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Source identifier, usually the file name.
    pub id: String,
    /// 1-based page number within the source, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with no page number and empty metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), page: None, text: text.into(), metadata: HashMap::new() }
    }

    /// Attach a page number.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Human-readable citation such as `tsla-10q.txt p.3`.
    pub fn citation(&self) -> String {
        citation(&self.id, self.page)
    }
}

fn citation(id: &str, page: Option<u32>) -> String {
    match page {
        Some(page) => format!("{id} p.{page}"),
        None => id.to_string(),
    }
}

/// A bounded-length window over a [`Document`].
///
/// The chunk refers back to its source by id and page only; it never owns
/// the document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}#{page}:{index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The page of the parent document, if it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Position of this chunk within its document.
    pub index: usize,
    /// Character offset (inclusive) of the chunk start within the document.
    pub start: usize,
    /// Character offset (exclusive) of the chunk end within the document.
    pub end: usize,
    /// Metadata inherited from the parent document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Human-readable citation of the source document.
    pub fn citation(&self) -> String {
        citation(&self.document_id, self.page)
    }
}

/// A retrieved [`Chunk`] paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// Insertion-order id of the index entry.
    pub entry_id: u64,
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The cosine similarity score (higher is more relevant).
    pub score: f32,
}
