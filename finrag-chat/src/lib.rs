//! # finrag-chat
//!
//! Question answering over 10-Q and 10-K filings.
//!
//! ## Overview
//!
//! - [`ConversationStateMachine`] - one chat session: retrieve, compose,
//!   generate, record
//! - [`PromptComposer`] - fills the prompt template
//! - [`ChatEngine`] - builds everything from an [`AppConfig`] and hands out
//!   sessions
//! - [`transcript`] - the legacy `<split>` transcript string
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use finrag_chat::{AppConfig, ChatEngine};
//!
//! let engine = ChatEngine::start(&AppConfig::default()).await?;
//! let session = engine.session();
//! let result = session.submit("What was total revenue last quarter?").await;
//! println!("{}", result.answer().unwrap_or("(no answer)"));
//! ```

pub mod config;
pub mod conversation;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod logging;
pub mod prompt;
pub mod session;
pub mod transcript;

pub use config::AppConfig;
pub use conversation::{Conversation, Speaker, Turn};
pub use corpus::load_corpus;
pub use engine::{ChatEngine, TurnReply};
pub use error::{ChatError, Result};
pub use prompt::{PromptComposer, PromptTemplate};
pub use session::{
    ConversationStateMachine, PipelineStep, RejectReason, SessionState, TurnFailure, TurnOutcome,
    TurnPipeline, TurnResult,
};
pub use transcript::TranscriptError;
