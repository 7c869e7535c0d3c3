//! End-to-end tests: corpus on disk, hash embeddings, mock generation.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use finrag_chat::engine::load_or_build_index;
use finrag_chat::{
    AppConfig, ChatEngine, ChatError, PipelineStep, RejectReason, TurnOutcome, load_corpus,
};
use finrag_rag::{EmbeddingProvider, HashEmbeddingProvider, RagConfig, RagError, VectorIndex};
use tempfile::TempDir;

/// Counts how many batches reach the embedder.
struct CountingEmbedder {
    inner: HashEmbeddingProvider,
    batches: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self { inner: HashEmbeddingProvider::new(32), batches: AtomicUsize::new(0) }
    }

    fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> finrag_rag::Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> finrag_rag::Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_id(&self) -> String {
        self.inner.model_id()
    }
}

fn write_corpus(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(
        root.join("tsla-10q-2023q3.txt"),
        "Total revenues were $23.4 billion.\x0cCash and cash equivalents were $15.9 billion.",
    )
    .unwrap();
    fs::write(root.join("aapl-10k-2023.txt"), "Net sales were $383.3 billion for the year.").unwrap();
}

fn config(temp: &TempDir) -> AppConfig {
    let corpus = temp.path().join("corpus");
    write_corpus(&corpus);
    AppConfig {
        corpus_dir: corpus,
        index_path: Some(temp.path().join("index.json")),
        embedding_model_identifier: "hash:64".into(),
        generation_backend_identifier: "mock:X".into(),
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn handle_turn_appends_to_the_legacy_transcript() {
    let temp = tempfile::tempdir().unwrap();
    let engine = ChatEngine::start(&config(&temp)).await.unwrap();

    let reply = engine.handle_turn("What is the revenue?", "").await;
    assert!(reply.is_completed());
    assert_eq!(reply.answer.as_deref(), Some("X"));
    assert_eq!(reply.transcript, "Human: What is the revenue?<split>ChatBot: X<split>");

    let reply = engine.handle_turn("And cash?", &reply.transcript).await;
    assert_eq!(
        reply.transcript,
        "Human: What is the revenue?<split>ChatBot: X<split>Human: And cash?<split>ChatBot: X<split>"
    );
}

#[tokio::test]
async fn handle_turn_keeps_prior_transcript_when_nothing_is_recorded() {
    let temp = tempfile::tempdir().unwrap();
    let engine = ChatEngine::start(&config(&temp)).await.unwrap();
    let prior = "Human: hi<split>ChatBot: hello<split>";

    let reply = engine.handle_turn("  ", prior).await;
    assert_eq!(reply.transcript, prior);
    assert!(matches!(reply.outcome, TurnOutcome::Rejected(RejectReason::EmptyInput)));

    let malformed = "Human: hi<split>ChatBot: hello";
    let reply = engine.handle_turn("What is the revenue?", malformed).await;
    assert_eq!(reply.transcript, malformed);
    assert!(reply.answer.is_none());
    match reply.outcome {
        TurnOutcome::Failed(failure) => {
            assert_eq!(failure.step, PipelineStep::Transcript);
            assert!(matches!(failure.error, ChatError::Transcript(_)));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn unanswered_prior_question_is_refused_without_corrupting_the_session() {
    let temp = tempfile::tempdir().unwrap();
    let engine = ChatEngine::start(&config(&temp)).await.unwrap();
    let prior = "Human: pending<split>";

    let reply = engine.handle_turn("q", prior).await;
    assert_eq!(reply.transcript, prior);
    assert!(matches!(
        reply.outcome,
        TurnOutcome::Failed(ref f) if f.step == PipelineStep::Transcript
    ));

    let reply = engine.handle_turn("q", "").await;
    let reply = engine.handle_turn("q2", &reply.transcript).await;
    assert!(reply.is_completed());
    assert_eq!(
        reply.transcript,
        "Human: q<split>ChatBot: X<split>Human: q2<split>ChatBot: X<split>"
    );
}

#[tokio::test]
async fn delimiter_fragments_in_questions_keep_the_transcript_usable() {
    let temp = tempfile::tempdir().unwrap();
    let engine = ChatEngine::start(&config(&temp)).await.unwrap();

    let first = engine.handle_turn("a<spl<split>it>b", "").await;
    assert!(first.is_completed());
    assert_eq!(first.transcript, "Human: ab<split>ChatBot: X<split>");

    let second = engine.handle_turn("What is the revenue?", &first.transcript).await;
    assert!(second.is_completed());
    assert_eq!(
        second.transcript,
        "Human: ab<split>ChatBot: X<split>Human: What is the revenue?<split>ChatBot: X<split>"
    );
}

#[tokio::test]
async fn start_persists_the_index() {
    let temp = tempfile::tempdir().unwrap();
    let config = config(&temp);
    let engine = ChatEngine::start(&config).await.unwrap();

    assert!(temp.path().join("index.json").exists());
    // Two pages of one filing plus one single-page filing, each under 500 chars.
    assert_eq!(engine.pipeline().retriever().index().len(), 3);
}

#[tokio::test]
async fn empty_corpus_aborts_startup() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("corpus");
    fs::create_dir_all(&corpus).unwrap();
    let config = AppConfig {
        corpus_dir: corpus,
        index_path: None,
        embedding_model_identifier: "hash:64".into(),
        generation_backend_identifier: "mock:X".into(),
        ..AppConfig::default()
    };

    let err = ChatEngine::start(&config).await.unwrap_err();
    assert!(matches!(err, ChatError::Rag(RagError::IndexBuildError(_))));
}

#[tokio::test]
async fn invalid_config_aborts_startup() {
    let temp = tempfile::tempdir().unwrap();
    let mut config = config(&temp);
    config.instruction_template = "{context} {question}".into();

    assert!(matches!(ChatEngine::start(&config).await, Err(ChatError::Config(_))));
}

#[tokio::test]
async fn stored_index_is_reused_only_when_fingerprint_matches() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("corpus");
    write_corpus(&corpus);
    let documents = load_corpus(&corpus).unwrap();
    let path = temp.path().join("index.json");
    let embedder = Arc::new(CountingEmbedder::new());
    let rag = RagConfig::default();

    let path = Some(path.as_path());
    let built = load_or_build_index(&documents, embedder.as_ref(), &rag, path).await.unwrap();
    assert_eq!(embedder.batches(), 1);

    let reused = load_or_build_index(&documents, embedder.as_ref(), &rag, path).await.unwrap();
    assert_eq!(embedder.batches(), 1);
    let ids = |index: &finrag_rag::FlatIndex| {
        index.entries().iter().map(|e| e.chunk.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&reused), ids(&built));

    let rechunked = RagConfig { chunk_overlap: 100, ..RagConfig::default() };
    load_or_build_index(&documents, embedder.as_ref(), &rechunked, path).await.unwrap();
    assert_eq!(embedder.batches(), 2);

    let mut edited = documents.clone();
    edited[0].text.push_str(" Restated.");
    load_or_build_index(&edited, embedder.as_ref(), &rechunked, path).await.unwrap();
    assert_eq!(embedder.batches(), 3);
}

#[tokio::test]
async fn corrupt_index_file_is_rebuilt() {
    let temp = tempfile::tempdir().unwrap();
    let corpus = temp.path().join("corpus");
    write_corpus(&corpus);
    let documents = load_corpus(&corpus).unwrap();
    let path = temp.path().join("index.json");
    fs::write(&path, "not an index").unwrap();
    let embedder = CountingEmbedder::new();

    let index = load_or_build_index(&documents, &embedder, &RagConfig::default(), Some(path.as_path()))
        .await
        .unwrap();
    assert_eq!(embedder.batches(), 1);
    assert_eq!(index.len(), 3);

    // The rebuilt index replaced the corrupt file.
    load_or_build_index(&documents, &embedder, &RagConfig::default(), Some(path.as_path())).await.unwrap();
    assert_eq!(embedder.batches(), 1);
}
