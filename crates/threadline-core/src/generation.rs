//! Assistant text generation collaborator.

use async_trait::async_trait;

use crate::error::DomainError;

/// Produces assistant reply text for a prompt.
#[async_trait]
pub trait AssistantGenerator: Send + Sync {
    /// Generates a reply to `prompt`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Generation` if the backend fails.
    async fn generate(&self, prompt: &str) -> Result<String, DomainError>;
}
