//! Fallback assistant generator.

use async_trait::async_trait;
use threadline_core::error::DomainError;
use threadline_core::generation::AssistantGenerator;

/// Answers every prompt with `echo:{prompt}`. Used when no model backend is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

#[async_trait]
impl AssistantGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, DomainError> {
        Ok(format!("echo:{prompt}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_generator_prefixes_prompt() {
        let reply = EchoGenerator.generate("hi there").await.unwrap();

        assert_eq!(reply, "echo:hi there");
    }
}
