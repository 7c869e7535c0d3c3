//! Document chunking.
//!
//! [`FixedSizeChunker`] cuts a document into windows of at most `chunk_size`
//! characters where each window repeats the last `chunk_overlap` characters
//! of its predecessor. Cuts are made on character count, not on sentence or
//! paragraph boundaries, so the output is fully determined by the text and
//! the two parameters.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks. Empty documents produce no chunks.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size, overlapping character windows.
///
/// Lengths are counted in `char`s so a cut never lands inside a UTF-8
/// sequence. Chunk IDs are `{document_id}#{page}:{index}` (or
/// `{document_id}:{index}` for documents without a page number).
///
/// # Example
///
/// ```rust
/// use finrag_rag::{Document, FixedSizeChunker};
///
/// let chunker = FixedSizeChunker::new(4, 2).unwrap();
/// let doc = Document::new("demo.txt", "ABCDEFGH");
/// let texts: Vec<String> = chunker.split(&doc).map(|c| c.text).collect();
/// assert_eq!(texts, ["ABCD", "CDEF", "EFGH"]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` — maximum number of characters per chunk
    /// * `chunk_overlap` — number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] unless `chunk_size > chunk_overlap`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// Maximum number of characters per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of characters shared by consecutive chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Lazily split a document. Clone the returned iterator to restart it.
    pub fn split<'a>(&self, document: &'a Document) -> Chunks<'a> {
        Chunks {
            document,
            chunk_size: self.chunk_size,
            step: self.chunk_size - self.chunk_overlap,
            start_byte: 0,
            start_char: 0,
            index: 0,
            done: document.text.is_empty(),
        }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(document).collect()
    }
}

/// Split `document` with the given parameters.
///
/// Shorthand for [`FixedSizeChunker::new`] followed by
/// [`FixedSizeChunker::split`].
pub fn split(document: &Document, chunk_size: usize, chunk_overlap: usize) -> Result<Chunks<'_>> {
    Ok(FixedSizeChunker::new(chunk_size, chunk_overlap)?.split(document))
}

/// Lazy iterator over the chunks of one document.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    document: &'a Document,
    chunk_size: usize,
    step: usize,
    start_byte: usize,
    start_char: usize,
    index: usize,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let rest = &self.document.text[self.start_byte..];
        let mut end_byte = rest.len();
        let mut next_byte = rest.len();
        let mut taken = 0;
        let mut reached_end = true;

        for (offset, _) in rest.char_indices() {
            if taken == self.step {
                next_byte = offset;
            }
            if taken == self.chunk_size {
                end_byte = offset;
                reached_end = false;
                break;
            }
            taken += 1;
        }

        let document = self.document;
        let chunk = Chunk {
            id: chunk_id(document, self.index),
            text: rest[..end_byte].to_string(),
            document_id: document.id.clone(),
            page: document.page,
            index: self.index,
            start: self.start_char,
            end: self.start_char + taken,
            metadata: document.metadata.clone(),
        };

        // The window that reaches the end of the text is the last one; any
        // later window would lie entirely inside it.
        if reached_end {
            self.done = true;
        } else {
            self.start_byte += next_byte;
            self.start_char += self.step;
            self.index += 1;
        }

        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

fn chunk_id(document: &Document, index: usize) -> String {
    match document.page {
        Some(page) => format!("{}#{page}:{index}", document.id),
        None => format!("{}:{index}", document.id),
    }
}
