//! The per-session conversation state machine.
//!
//! ```text
//!            submit(text)                 answer or failure
//!   Idle  ────────────────▶ AwaitingResponse ────────────────▶ Idle
//!    ▲  │ empty text                    │ submit while busy
//!    └──┘ Rejected                      └─▶ Rejected
//! ```
//!
//! A submitted user turn is staged, not recorded. Only when generation
//! succeeds are the user turn and the answer appended together, so a failed
//! turn leaves the [`Conversation`] exactly as it was.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use finrag_model::LanguageModel;
use finrag_rag::Retriever;
use tracing::{debug, error, info, warn};

use crate::conversation::{Conversation, Turn};
use crate::error::ChatError;
use crate::prompt::PromptComposer;

/// Where a session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ready for the next question.
    Idle,
    /// A question is being answered.
    AwaitingResponse,
}

/// The pipeline stage a failed turn stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    /// Decoding the caller's prior transcript.
    Transcript,
    /// Embedding the question and searching the index.
    Retrieve,
    /// Calling the language model.
    Generate,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transcript => "transcript",
            Self::Retrieve => "retrieve",
            Self::Generate => "generate",
        })
    }
}

/// Why a submission was refused without running the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The text was empty or whitespace.
    EmptyInput,
    /// Another turn of this session is still in flight.
    TurnInFlight,
}

/// A pipeline failure together with the step that produced it.
#[derive(Debug)]
pub struct TurnFailure {
    /// The step that failed.
    pub step: PipelineStep,
    /// The underlying error.
    pub error: ChatError,
}

impl fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} step failed: {}", self.step, self.error)
    }
}

/// How a submission ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The answer was recorded.
    Completed,
    /// Nothing ran and nothing changed.
    Rejected(RejectReason),
    /// The pipeline failed and nothing changed.
    Failed(TurnFailure),
}

/// The conversation after a submission plus how the submission ended.
#[derive(Debug)]
pub struct TurnResult {
    /// Snapshot of the session's conversation.
    pub conversation: Conversation,
    /// What happened to the submitted turn.
    pub outcome: TurnOutcome,
}

impl TurnResult {
    /// Whether an answer was recorded.
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Completed)
    }

    /// The recorded answer, when the turn completed.
    pub fn answer(&self) -> Option<&str> {
        if self.is_completed() { self.conversation.last_answer() } else { None }
    }
}

/// The shared, stateless half of a session: retrieve, compose, generate.
///
/// Cloning is cheap; every session of an engine holds a clone.
#[derive(Clone)]
pub struct TurnPipeline {
    retriever: Retriever,
    composer: Arc<PromptComposer>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
}

impl fmt::Debug for TurnPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TurnPipeline")
            .field("retriever", &self.retriever)
            .field("model", &self.model.name())
            .field("top_k", &self.top_k)
            .finish()
    }
}

impl TurnPipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        retriever: Retriever,
        composer: Arc<PromptComposer>,
        model: Arc<dyn LanguageModel>,
        top_k: usize,
    ) -> Self {
        Self { retriever, composer, model, top_k }
    }

    /// The retriever used for every question.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// The language model used for every answer.
    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    /// Answer `question` given the turns that precede it.
    pub async fn answer(&self, question: &str, history: &[Turn]) -> Result<String, TurnFailure> {
        let chunks = self
            .retriever
            .retrieve(question, self.top_k)
            .await
            .map_err(|e| TurnFailure { step: PipelineStep::Retrieve, error: e.into() })?;
        debug!(
            sources = ?chunks.iter().map(|r| r.chunk.citation()).collect::<Vec<_>>(),
            "context selected"
        );

        let prompt = self.composer.compose(question, &chunks, history);

        self.model
            .generate(&prompt)
            .await
            .map_err(|e| TurnFailure { step: PipelineStep::Generate, error: e.into() })
    }
}

struct SessionInner {
    conversation: Conversation,
    state: SessionState,
    pending: Option<Turn>,
}

/// Drives one conversation through question and answer turns.
///
/// The lock guarding the session is never held while the pipeline runs, so
/// a second `submit` during generation is observed and rejected rather than
/// queued.
pub struct ConversationStateMachine {
    pipeline: TurnPipeline,
    inner: Mutex<SessionInner>,
}

impl fmt::Debug for ConversationStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ConversationStateMachine")
            .field("state", &inner.state)
            .field("turns", &inner.conversation.len())
            .finish()
    }
}

/// Returns the session to `Idle` if a turn is abandoned mid-flight.
struct InFlight<'a> {
    machine: &'a ConversationStateMachine,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.machine.lock();
            inner.state = SessionState::Idle;
            inner.pending = None;
        }
    }
}

impl ConversationStateMachine {
    /// A new, empty session.
    pub fn new(pipeline: TurnPipeline) -> Self {
        Self::resume(pipeline, Conversation::new())
    }

    /// A session continuing an existing conversation.
    pub fn resume(pipeline: TurnPipeline, conversation: Conversation) -> Self {
        Self {
            pipeline,
            inner: Mutex::new(SessionInner { conversation, state: SessionState::Idle, pending: None }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Snapshot of the recorded conversation.
    pub fn conversation(&self) -> Conversation {
        self.lock().conversation.clone()
    }

    /// The user turn currently being answered, if any.
    pub fn pending_turn(&self) -> Option<Turn> {
        self.lock().pending.clone()
    }

    /// Submit a question and wait for the turn to finish.
    ///
    /// Empty or whitespace-only text and submissions while a turn is in
    /// flight are [`Rejected`](TurnOutcome::Rejected). Pipeline failures are
    /// [`Failed`](TurnOutcome::Failed) and leave the conversation unchanged.
    /// The user turn is recorded exactly as submitted.
    pub async fn submit(&self, user_text: &str) -> TurnResult {
        let history = {
            let mut inner = self.lock();
            if user_text.trim().is_empty() {
                warn!("rejected empty question");
                return TurnResult {
                    conversation: inner.conversation.clone(),
                    outcome: TurnOutcome::Rejected(RejectReason::EmptyInput),
                };
            }
            if inner.state == SessionState::AwaitingResponse {
                warn!("rejected question while another turn is in flight");
                return TurnResult {
                    conversation: inner.conversation.clone(),
                    outcome: TurnOutcome::Rejected(RejectReason::TurnInFlight),
                };
            }
            inner.state = SessionState::AwaitingResponse;
            inner.pending = Some(Turn::user(user_text));
            inner.conversation.clone()
        };
        let mut in_flight = InFlight { machine: self, armed: true };

        let answer = self.pipeline.answer(user_text, history.turns()).await;

        in_flight.armed = false;
        let mut inner = self.lock();
        inner.state = SessionState::Idle;
        let user_turn = inner.pending.take().unwrap_or_else(|| Turn::user(user_text));

        let outcome = match answer {
            Ok(answer) => {
                info!(turns = inner.conversation.len() + 2, "turn completed");
                inner.conversation.push(user_turn);
                inner.conversation.push(Turn::assistant(answer));
                TurnOutcome::Completed
            }
            Err(failure) => {
                error!(
                    query = user_text,
                    step = %failure.step,
                    error = %failure.error,
                    transient = failure.error.is_transient(),
                    "turn failed"
                );
                TurnOutcome::Failed(failure)
            }
        };

        TurnResult { conversation: inner.conversation.clone(), outcome }
    }
}
