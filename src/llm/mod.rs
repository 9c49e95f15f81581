//! Text-generation collaborator.
//!
//! Optional: when no endpoint is configured the agent runs entirely on its
//! local fallbacks.

pub mod openai_compat;
pub mod provider;

pub use openai_compat::OpenAiCompatGenerator;
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Configuration for creating a text generator.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub endpoint: String,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create a generator from configuration.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>, LlmError> {
    let generator =
        OpenAiCompatGenerator::new(&config.endpoint, config.api_key.clone(), &config.model)?;
    tracing::info!("Using text generation endpoint {} (model: {})", config.endpoint, config.model);
    Ok(Arc::new(generator))
}
