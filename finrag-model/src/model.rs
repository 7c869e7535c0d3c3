//! The language model capability.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Turns a prompt into answer text.
///
/// Every backend (hosted API, local daemon, test double) implements this one
/// trait; callers hold an `Arc<dyn LanguageModel>` and never branch on which
/// backend is behind it. Implementations do not retry: a failed call returns
/// its [`ModelError`](crate::ModelError) immediately so that retry policy
/// stays with the caller.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short identifier for logs, e.g. `openai:gpt-3.5-turbo`.
    fn name(&self) -> &str;

    /// Generate a complete answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}
