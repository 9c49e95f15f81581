//! OpenAI-compatible chat completions client.
//!
//! Any endpoint that speaks `POST {base}/chat/completions` works: OpenAI,
//! OpenRouter, a local llama.cpp server and so on.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::LlmError;
use crate::llm::TextGenerator;

const PROVIDER: &str = "openai-compat";

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Generator backed by an OpenAI-compatible HTTP endpoint.
pub struct OpenAiCompatGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiCompatGenerator {
    pub fn new(base_url: &str, api_key: SecretString, model: &str) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let resp = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited {
                provider: PROVIDER.into(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("{status}: {text}"),
            });
        }

        let raw = resp.text().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;
        extract_content(&raw)
    }
}

/// Pull the first choice's text out of a chat completion body.
fn extract_content(raw: &str) -> Result<String, LlmError> {
    let completion: ChatCompletion = serde_json::from_str(raw)?;
    let content = completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if content.is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "empty completion".into(),
        });
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_strips_trailing_slash() {
        let g = OpenAiCompatGenerator::new(
            "https://api.example.com/v1/",
            SecretString::from("sk-test".to_string()),
            "gpt-4o-mini",
        )
        .unwrap();
        assert_eq!(g.completions_url(), "https://api.example.com/v1/chat/completions");
        assert_eq!(g.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn extract_first_choice() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"  hi there \n"}}]}"#;
        assert_eq!(extract_content(raw).unwrap(), "hi there");
    }

    #[test]
    fn extract_rejects_empty() {
        let raw = r#"{"choices":[]}"#;
        assert!(matches!(
            extract_content(raw),
            Err(LlmError::InvalidResponse { .. })
        ));
        let raw = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert!(extract_content(raw).is_err());
    }

    #[test]
    fn extract_rejects_malformed_json() {
        assert!(matches!(extract_content("<html>"), Err(LlmError::Json(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let g = OpenAiCompatGenerator::new(
            "http://127.0.0.1:9",
            SecretString::from("sk-test".to_string()),
            "m",
        )
        .unwrap();
        assert!(g.generate("hi", 8, 0.5).await.is_err());
    }
}
