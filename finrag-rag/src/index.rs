//! Vector index for similarity search over embedded chunks.
//!
//! [`FlatIndex`] is an exact nearest-neighbour index: it scores every entry
//! with cosine similarity on each query. At the scale of a handful of filings
//! (hundreds to low thousands of chunks) that is fast enough, and the
//! [`VectorIndex`] trait leaves room for an approximate structure later.
//!
//! An index is built once, validated as a whole, and read-only afterwards.
//! It can be written to disk together with an [`IndexManifest`] describing
//! how it was built, so a restart with unchanged settings can skip
//! re-embedding the corpus.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::chunking::FixedSizeChunker;
use crate::document::{Chunk, Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Version of the on-disk layout written by [`FlatIndex::save`].
const FORMAT_VERSION: u32 = 1;

/// A read-only similarity index over embedded chunks.
///
/// Implementations must be safe to search from many tasks at once.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Ties are broken by insertion order. `k` larger than the index is
    /// clamped to its size.
    ///
    /// # Errors
    ///
    /// - [`RagError::InvalidArgument`] if `k == 0` or the query is not finite
    /// - [`RagError::DimensionMismatch`] if the query has the wrong length
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Number of entries in the index.
    fn len(&self) -> usize;

    /// Whether the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality fixed when the index was built.
    fn dimensions(&self) -> usize;

    /// Identifier of the embedding model the index was built with.
    fn model_id(&self) -> &str;
}

/// One stored `(id, embedding, chunk)` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Opaque id assigned in insertion order, starting at zero.
    pub id: u64,
    /// The indexed chunk.
    pub chunk: Chunk,
    /// The chunk's embedding.
    pub embedding: Vec<f32>,
}

/// Exact cosine-similarity index held in memory.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    entries: Vec<IndexEntry>,
    norms: Vec<f32>,
    dimensions: usize,
    model_id: String,
}

impl FlatIndex {
    /// Embed every chunk once and build the index.
    ///
    /// Chunks are sent to the embedder in batches of `batch_size`. The
    /// returned index is complete; on any failure nothing is returned.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if `batch_size == 0`
    /// - [`RagError::IndexBuildError`] if there are no chunks, the embedder
    ///   fails, or it returns the wrong number of vectors or a vector with
    ///   the wrong dimensionality or non-finite values
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(RagError::ConfigError("embed batch size must be greater than zero".into()));
        }
        if chunks.is_empty() {
            return Err(RagError::IndexBuildError("no chunks to index".into()));
        }

        let dimensions = embedder.dimensions();
        let model_id = embedder.model_id();
        if dimensions == 0 {
            return Err(RagError::IndexBuildError(format!(
                "embedder '{model_id}' reports zero dimensions"
            )));
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = embedder.embed_batch(&texts).await.map_err(|e| {
                RagError::IndexBuildError(format!(
                    "embedding batch {batch_no} (first chunk '{}') failed: {e}",
                    batch[0].id
                ))
            })?;
            if vectors.len() != batch.len() {
                return Err(RagError::IndexBuildError(format!(
                    "embedder returned {} vectors for a batch of {}",
                    vectors.len(),
                    batch.len()
                )));
            }
            debug!(batch_no, batch_size = batch.len(), "embedded batch");
            embeddings.extend(vectors);
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, embedding))| IndexEntry { id: i as u64, chunk, embedding })
            .collect();

        let index = Self::from_entries(entries, dimensions, model_id)
            .map_err(|e| RagError::IndexBuildError(e.to_string()))?;
        info!(entries = index.len(), dimensions, model = %index.model_id, "vector index built");
        Ok(index)
    }

    /// Assemble an index from stored entries, validating every vector.
    fn from_entries(entries: Vec<IndexEntry>, dimensions: usize, model_id: String) -> Result<Self> {
        let mut norms = Vec::with_capacity(entries.len());
        for entry in &entries {
            if entry.embedding.len() != dimensions {
                return Err(RagError::DimensionMismatch {
                    expected: dimensions,
                    actual: entry.embedding.len(),
                });
            }
            if entry.embedding.iter().any(|x| !x.is_finite()) {
                return Err(RagError::InvalidArgument(format!(
                    "embedding for chunk '{}' contains non-finite values",
                    entry.chunk.id
                )));
            }
            norms.push(l2_norm(&entry.embedding));
        }
        Ok(Self { entries, norms, dimensions, model_id })
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Synchronous search used by the [`VectorIndex`] implementation.
    pub fn search_sync(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(RagError::InvalidArgument("k must be greater than zero".into()));
        }
        if query.len() != self.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if query.iter().any(|x| !x.is_finite()) {
            return Err(RagError::InvalidArgument("query vector contains non-finite values".into()));
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (entry, norm))| (i, cosine_similarity(&entry.embedding, *norm, query, query_norm)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let entry = &self.entries[i];
                SearchResult { entry_id: entry.id, chunk: entry.chunk.clone(), score }
            })
            .collect())
    }

    /// Write the index and its manifest to `path`.
    ///
    /// The file is written next to its destination and renamed into place,
    /// so readers never observe a half-written index.
    pub fn save(&self, path: &Path, manifest: &IndexManifest) -> Result<()> {
        if manifest.model_id != self.model_id || manifest.dimensions != self.dimensions {
            return Err(RagError::ConfigError(format!(
                "manifest describes {} ({} dims) but index holds {} ({} dims)",
                manifest.model_id, manifest.dimensions, self.model_id, self.dimensions
            )));
        }

        let persist_err = |message: String| RagError::PersistenceError {
            path: path.display().to_string(),
            message,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| persist_err(e.to_string()))?;
        }

        let tmp_path = path.with_extension("tmp");
        let stored = StoredIndexRef {
            format_version: FORMAT_VERSION,
            manifest,
            entries: &self.entries,
        };
        {
            let file = File::create(&tmp_path).map_err(|e| persist_err(e.to_string()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &stored).map_err(|e| persist_err(e.to_string()))?;
            writer.flush().map_err(|e| persist_err(e.to_string()))?;
        }
        fs::rename(&tmp_path, path).map_err(|e| persist_err(e.to_string()))?;

        info!(path = %path.display(), entries = self.len(), "vector index saved");
        Ok(())
    }

    /// Read an index previously written by [`save`](FlatIndex::save).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] if the file is missing,
    /// unreadable, of an unknown format version, or internally inconsistent.
    pub fn load(path: &Path) -> Result<(Self, IndexManifest)> {
        let persist_err = |message: String| RagError::PersistenceError {
            path: path.display().to_string(),
            message,
        };

        let file = File::open(path).map_err(|e| persist_err(e.to_string()))?;
        let stored: StoredIndex = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| persist_err(format!("invalid index file: {e}")))?;

        if stored.format_version != FORMAT_VERSION {
            return Err(persist_err(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                stored.format_version
            )));
        }

        let manifest = stored.manifest;
        let index =
            Self::from_entries(stored.entries, manifest.dimensions, manifest.model_id.clone())
                .map_err(|e| persist_err(e.to_string()))?;
        if index.is_empty() {
            return Err(persist_err("index file holds no entries".into()));
        }

        info!(path = %path.display(), entries = index.len(), "vector index loaded");
        Ok((index, manifest))
    }
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.search_sync(query, k)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Everything that determines the contents of an index.
///
/// A stored index is only reusable when its manifest equals the manifest of
/// the current configuration and corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    /// Identifier of the embedding model.
    pub model_id: String,
    /// Embedding dimensionality.
    pub dimensions: usize,
    /// Chunk size used when splitting.
    pub chunk_size: usize,
    /// Chunk overlap used when splitting.
    pub chunk_overlap: usize,
    /// SHA-256 over the ingested documents.
    pub corpus_digest: String,
}

impl IndexManifest {
    /// Describe an index built from `documents` with the given chunker and embedder.
    pub fn new(
        embedder: &dyn EmbeddingProvider,
        chunker: &FixedSizeChunker,
        documents: &[Document],
    ) -> Self {
        Self {
            model_id: embedder.model_id(),
            dimensions: embedder.dimensions(),
            chunk_size: chunker.chunk_size(),
            chunk_overlap: chunker.chunk_overlap(),
            corpus_digest: corpus_digest(documents),
        }
    }
}

/// Digest of document ids, pages, metadata and text, in order.
pub fn corpus_digest(documents: &[Document]) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    for doc in documents {
        field(&mut hasher, doc.id.as_bytes());
        match doc.page {
            Some(page) => {
                hasher.update([1]);
                hasher.update(page.to_le_bytes());
            }
            None => hasher.update([0]),
        }

        let mut metadata: Vec<_> = doc.metadata.iter().collect();
        metadata.sort();
        hasher.update((metadata.len() as u64).to_le_bytes());
        for (key, value) in metadata {
            field(&mut hasher, key.as_bytes());
            field(&mut hasher, value.as_bytes());
        }

        field(&mut hasher, doc.text.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Serialize)]
struct StoredIndexRef<'a> {
    format_version: u32,
    manifest: &'a IndexManifest,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct StoredIndex {
    format_version: u32,
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity with precomputed norms. Returns 0.0 if either vector
/// has zero magnitude.
fn cosine_similarity(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;

    /// Returns a preset vector per chunk text.
    struct TableEmbedder(HashMap<&'static str, Vec<f32>>);

    #[async_trait]
    impl EmbeddingProvider for TableEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0.get(text).cloned().ok_or_else(|| RagError::EmbeddingError {
                provider: "table".into(),
                message: format!("unknown text '{text}'"),
            })
        }

        fn dimensions(&self) -> usize {
            3
        }

        fn model_id(&self) -> String {
            "table:3".into()
        }
    }

    fn chunk(text: &str, index: usize) -> Chunk {
        Chunk {
            id: format!("doc:{index}"),
            text: text.to_string(),
            document_id: "doc".into(),
            page: None,
            index,
            start: 0,
            end: text.chars().count(),
            metadata: HashMap::new(),
        }
    }

    fn three_chunk_embedder() -> TableEmbedder {
        TableEmbedder(HashMap::from([
            ("one", vec![1.0, 0.0, 0.0]),
            ("two", vec![0.0, 1.0, 0.0]),
            ("three", vec![0.0, 0.0, 1.0]),
        ]))
    }

    async fn three_chunk_index() -> FlatIndex {
        let chunks = vec![chunk("one", 0), chunk("two", 1), chunk("three", 2)];
        FlatIndex::build(chunks, &three_chunk_embedder(), 2).await.unwrap()
    }

    #[tokio::test]
    async fn query_equal_to_an_embedding_finds_that_chunk() {
        let index = three_chunk_index().await;
        let results = index.search(&[0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.text, "two");
        assert_eq!(results[0].entry_id, 1);
        assert!((results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order_and_k_is_clamped() {
        let index = three_chunk_index().await;
        // Orthogonal to "one", equally similar to "two" and "three".
        let results = index.search(&[0.0, 1.0, 1.0], 10).await.unwrap();
        let ids: Vec<u64> = results.iter().map(|r| r.entry_id).collect();
        assert_eq!(ids, [1, 2, 0]);
    }

    #[tokio::test]
    async fn zero_k_and_wrong_dimensions_are_rejected() {
        let index = three_chunk_index().await;
        assert!(matches!(index.search(&[1.0, 0.0, 0.0], 0).await, Err(RagError::InvalidArgument(_))));
        assert!(matches!(
            index.search(&[1.0, 0.0], 1).await,
            Err(RagError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn build_fails_whole_when_one_chunk_cannot_be_embedded() {
        let chunks = vec![chunk("one", 0), chunk("unknown", 1)];
        let err = FlatIndex::build(chunks, &three_chunk_embedder(), 8).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuildError(_)));
    }

    #[tokio::test]
    async fn build_rejects_wrong_dimensionality() {
        let embedder = TableEmbedder(HashMap::from([("short", vec![1.0, 0.0])]));
        let err = FlatIndex::build(vec![chunk("short", 0)], &embedder, 8).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuildError(_)));
    }

    #[tokio::test]
    async fn build_rejects_empty_corpus() {
        let err = FlatIndex::build(Vec::new(), &three_chunk_embedder(), 8).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuildError(_)));
    }

    #[tokio::test]
    async fn save_then_load_preserves_entries_and_manifest() {
        let index = three_chunk_index().await;
        let manifest = IndexManifest {
            model_id: "table:3".into(),
            dimensions: 3,
            chunk_size: 500,
            chunk_overlap: 300,
            corpus_digest: "abc".into(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/index.json");

        index.save(&path, &manifest).unwrap();
        let (loaded, loaded_manifest) = FlatIndex::load(&path).unwrap();

        assert_eq!(loaded_manifest, manifest);
        assert_eq!(loaded.entries(), index.entries());
        assert_eq!(loaded.model_id(), "table:3");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn loading_garbage_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(FlatIndex::load(&path), Err(RagError::PersistenceError { .. })));
    }

    #[test]
    fn corpus_digest_tracks_text_and_pages() {
        let a = [Document::new("f.txt", "revenue").with_page(1)];
        let b = [Document::new("f.txt", "revenue").with_page(2)];
        let c = [Document::new("f.txt", "revenues").with_page(1)];
        assert_eq!(corpus_digest(&a), corpus_digest(&a));
        assert_ne!(corpus_digest(&a), corpus_digest(&b));
        assert_ne!(corpus_digest(&a), corpus_digest(&c));
    }

    #[test]
    fn corpus_digest_distinguishes_missing_page_from_page_zero() {
        let unpaged = [Document::new("f.txt", "revenue")];
        let page_zero = [Document::new("f.txt", "revenue").with_page(0)];
        assert_ne!(corpus_digest(&unpaged), corpus_digest(&page_zero));
    }

    #[test]
    fn corpus_digest_tracks_metadata_in_any_insertion_order() {
        let plain = Document::new("f.txt", "revenue").with_page(1);
        let mut tagged = plain.clone();
        tagged.metadata.insert("form".into(), "10-Q".into());
        tagged.metadata.insert("ticker".into(), "TSLA".into());
        let mut reordered = plain.clone();
        reordered.metadata.insert("ticker".into(), "TSLA".into());
        reordered.metadata.insert("form".into(), "10-Q".into());

        assert_ne!(corpus_digest(&[plain]), corpus_digest(&[tagged.clone()]));
        assert_eq!(corpus_digest(&[tagged]), corpus_digest(&[reordered]));
    }
}
