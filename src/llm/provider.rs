//! Text-generation collaborator contract.

use async_trait::async_trait;

use crate::error::LlmError;

/// An unreliable source of generated text.
///
/// Every caller must hold a local deterministic fallback; an `Err` here is
/// never shown to a chat.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError>;
}
