//! # finrag-model
//!
//! Generation backends for the finrag filing assistant.
//!
//! ## Overview
//!
//! - [`LanguageModel`] - the single capability every backend implements
//! - [`OpenAIChatModel`](openai::OpenAIChatModel) - hosted OpenAI chat completions
//! - [`OllamaModel`](ollama::OllamaModel) - a model run locally by Ollama
//! - [`MockModel`] - scripted answers for tests and offline runs
//! - [`RetryingModel`] / [`TimeoutModel`] - caller-side retry and latency bounds
//!
//! Backends are chosen once, at construction, from an identifier such as
//! `openai:gpt-3.5-turbo` (see [`ModelBackend`]).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use finrag_model::{BackendSettings, ModelBackend, RetryPolicy, RetryingModel};
//!
//! let backend: ModelBackend = "ollama:llama2".parse()?;
//! let model = backend.connect(&BackendSettings::default())?;
//! let model = RetryingModel::new(model, RetryPolicy { max_retries: 2, ..Default::default() });
//! let answer = model.generate(&prompt).await?;
//! ```

pub mod backend;
pub mod error;
pub mod http;
pub mod mock;
pub mod model;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;
pub mod policy;

pub use backend::{BackendSettings, ModelBackend};
pub use error::{ModelError, Result};
pub use mock::MockModel;
pub use model::LanguageModel;
pub use policy::{RetryPolicy, RetryingModel, TimeoutModel};
