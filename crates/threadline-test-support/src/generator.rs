//! Test generators — canned `AssistantGenerator` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use threadline_core::error::DomainError;
use threadline_core::generation::AssistantGenerator;

/// A generator that always answers with the same text and records the
/// prompts it was given.
#[derive(Debug)]
pub struct StaticGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl StaticGenerator {
    /// Create a generator answering every prompt with `reply`.
    #[must_use]
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Returns every prompt received so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantGenerator for StaticGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, DomainError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        Ok(self.reply.clone())
    }
}

/// A generator that always fails. Useful for testing error-handling paths.
#[derive(Debug)]
pub struct FailingGenerator;

#[async_trait]
impl AssistantGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, DomainError> {
        Err(DomainError::Generation("model unavailable".into()))
    }
}
