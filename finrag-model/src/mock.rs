//! Scriptable [`LanguageModel`] for tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{ModelError, Result};
use crate::model::LanguageModel;

/// A language model that replays scripted outcomes.
///
/// Queued outcomes are returned first, in order; once the queue is empty
/// every call returns the default answer. Every prompt received is recorded.
///
/// # Example
///
/// ```rust
/// # tokio_test_block_on(async {
/// use finrag_model::{LanguageModel, MockModel};
///
/// let model = MockModel::new("X");
/// assert_eq!(model.generate("anything").await.unwrap(), "X");
/// assert_eq!(model.prompts(), ["anything"]);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct MockModel {
    name: String,
    default_answer: String,
    script: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl MockModel {
    /// Create a mock that always answers `answer`.
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            name: "mock".to_string(),
            default_answer: answer.into(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            delay: None,
            gate: None,
        }
    }

    /// Queue an outcome to be returned before the default answer.
    pub fn then(self, outcome: Result<String>) -> Self {
        self.lock_script().push_back(outcome);
        self
    }

    /// Queue a failure.
    pub fn then_fail(self, error: ModelError) -> Self {
        self.then(Err(error))
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold every call until a permit is available on `gate`.
    ///
    /// Lets a test keep a generation in flight for as long as it needs.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or_default()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|_| ModelError::BackendUnavailable {
                backend: self.name.clone(),
                message: "gate closed".into(),
            })?;
            permit.forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.lock_script().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_answer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_then_default() {
        let model = MockModel::new("default")
            .then(Ok("first".into()))
            .then_fail(ModelError::BackendUnavailable { backend: "mock".into(), message: "".into() });

        assert_eq!(model.generate("a").await.unwrap(), "first");
        assert!(model.generate("b").await.is_err());
        assert_eq!(model.generate("c").await.unwrap(), "default");
        assert_eq!(model.prompts(), ["a", "b", "c"]);
        assert_eq!(model.call_count(), 3);
    }
}
