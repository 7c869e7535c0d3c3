//! Startup wiring and the transcript-level entry point.

use std::path::Path;
use std::sync::Arc;

use finrag_model::{LanguageModel, RetryingModel, TimeoutModel};
use finrag_rag::{
    Document, EmbeddingProvider, FlatIndex, IndexManifest, RagConfig, Retriever, VectorIndex,
};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::corpus::load_corpus;
use crate::error::Result;
use crate::prompt::PromptComposer;
use crate::session::{
    ConversationStateMachine, PipelineStep, TurnFailure, TurnOutcome, TurnPipeline,
};
use crate::transcript;

/// Result of [`ChatEngine::handle_turn`].
#[derive(Debug)]
pub struct TurnReply {
    /// The updated transcript, or the prior one if nothing was recorded.
    pub transcript: String,
    /// The new answer, when the turn completed.
    pub answer: Option<String>,
    /// How the turn ended.
    pub outcome: TurnOutcome,
}

impl TurnReply {
    /// Whether an answer was recorded.
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Completed)
    }
}

/// The assembled assistant: one retriever, one composer and one model,
/// shared by every session.
///
/// # Example
///
/// ```rust,ignore
/// let engine = ChatEngine::start(&AppConfig::load("finrag.json")?).await?;
/// let reply = engine.handle_turn("What was total revenue?", "").await;
/// ```
#[derive(Debug, Clone)]
pub struct ChatEngine {
    pipeline: TurnPipeline,
}

impl ChatEngine {
    /// Validate the configuration, index the corpus and connect the model.
    ///
    /// # Errors
    ///
    /// Any configuration, corpus, embedding or index failure aborts startup.
    pub async fn start(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let retriever = prepare_retriever(config).await?;
        let model = connect_model(config)?;
        let composer = config.composer()?;
        info!(
            model = model.name(),
            embedder = %config.embedding_model_identifier,
            top_k = config.rag.top_k,
            "chat engine ready"
        );
        Ok(Self::from_parts(retriever, composer, model, config.rag.top_k))
    }

    /// Assemble an engine from already-built parts.
    pub fn from_parts(
        retriever: Retriever,
        composer: PromptComposer,
        model: Arc<dyn LanguageModel>,
        top_k: usize,
    ) -> Self {
        Self { pipeline: TurnPipeline::new(retriever, Arc::new(composer), model, top_k) }
    }

    /// The shared turn pipeline.
    pub fn pipeline(&self) -> &TurnPipeline {
        &self.pipeline
    }

    /// Start a new, empty session.
    pub fn session(&self) -> ConversationStateMachine {
        ConversationStateMachine::new(self.pipeline.clone())
    }

    /// Answer one question for a caller that keeps the legacy transcript.
    ///
    /// The prior transcript is decoded, the turn is run as in
    /// [`ConversationStateMachine::submit`] and the result is encoded again.
    /// Unless the turn completes, the prior transcript is returned unchanged.
    pub async fn handle_turn(&self, user_text: &str, prior_transcript: &str) -> TurnReply {
        let conversation = match transcript::decode(prior_transcript) {
            Ok(conversation) => conversation,
            Err(e) => {
                error!(query = user_text, step = %PipelineStep::Transcript, error = %e, "turn failed");
                return TurnReply {
                    transcript: prior_transcript.to_string(),
                    answer: None,
                    outcome: TurnOutcome::Failed(TurnFailure {
                        step: PipelineStep::Transcript,
                        error: e.into(),
                    }),
                };
            }
        };

        let session = ConversationStateMachine::resume(self.pipeline.clone(), conversation);
        let result = session.submit(user_text).await;
        let answer = result.answer().map(str::to_string);
        let transcript = if answer.is_some() {
            transcript::encode(&result.conversation)
        } else {
            prior_transcript.to_string()
        };
        TurnReply { transcript, answer, outcome: result.outcome }
    }
}

/// Connect the embedder, load the corpus and build or reuse the index.
pub async fn prepare_retriever(config: &AppConfig) -> Result<Retriever> {
    let embedder = config.embedding_backend()?.connect(&config.embedding_settings()).await?;
    let documents = load_corpus(&config.corpus_dir)?;
    let index =
        load_or_build_index(&documents, embedder.as_ref(), &config.rag, config.index_path.as_deref())
            .await?;
    Ok(Retriever::new(embedder, Arc::new(index))?)
}

/// Reuse the index stored at `index_path` if it was built from exactly
/// these documents and settings; otherwise build it and store it there.
pub async fn load_or_build_index(
    documents: &[Document],
    embedder: &dyn EmbeddingProvider,
    rag: &RagConfig,
    index_path: Option<&Path>,
) -> Result<FlatIndex> {
    let chunker = rag.chunker()?;
    let manifest = IndexManifest::new(embedder, &chunker, documents);

    if let Some(path) = index_path.filter(|p| p.exists()) {
        match FlatIndex::load(path) {
            Ok((index, stored)) if stored == manifest => {
                info!(path = %path.display(), entries = index.len(), "reusing stored index");
                return Ok(index);
            }
            Ok(_) => info!(path = %path.display(), "stored index is stale, rebuilding"),
            Err(e) => warn!(path = %path.display(), error = %e, "stored index unreadable, rebuilding"),
        }
    }

    let chunks = documents.iter().flat_map(|doc| chunker.split(doc)).collect();
    let index = FlatIndex::build(chunks, embedder, rag.embed_batch_size).await?;
    if let Some(path) = index_path {
        index.save(path, &manifest)?;
        info!(path = %path.display(), "index saved");
    }
    Ok(index)
}

/// Connect the configured generation backend with its timeout and retry
/// wrappers.
pub fn connect_model(config: &AppConfig) -> Result<Arc<dyn LanguageModel>> {
    let mut model = config.model_backend()?.connect(&config.backend_settings())?;
    if let Some(timeout) = config.generation_timeout() {
        model = Arc::new(TimeoutModel::new(model, timeout));
    }
    if config.retry.max_retries > 0 {
        model = Arc::new(RetryingModel::new(model, config.retry));
    }
    Ok(model)
}
