//! Chat-completions client for the Groq OpenAI-compatible API
//!
//! The credential is injected at construction; an unset credential is a
//! constructor error, so a missing key degrades the chat feature only
//! and the rest of the service never touches this module.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const CHAT_MODEL: &str = "llama-3.3-70b-versatile";
const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 2048;

/// Chat-completions client errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Chat service credential is not configured")]
    MissingApiKey,

    #[error("Chat service authentication failed")]
    AuthFailed,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Chat service error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Groq chat-completions client
#[derive(Debug, Clone)]
pub struct LlmClient {
    http_client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Self::with_base_url(api_key, GROQ_BASE_URL.to_string())
    }

    /// Alternate endpoint, used to point tests at a local stand-in
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            base_url,
        })
    }

    /// Send one prompt as a single user message, returning the reply text
    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = CompletionRequest {
            model: CHAT_MODEL,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        tracing::debug!(model = CHAT_MODEL, prompt_len = prompt.len(), "Calling chat service");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LlmError::AuthFailed);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or(body);
            return Err(LlmError::Api(status.as_u16(), message));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_blank_key_is_rejected() {
        assert!(matches!(
            LlmClient::new(String::new()),
            Err(LlmError::MissingApiKey)
        ));
        assert!(matches!(
            LlmClient::new("   ".to_string()),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn client_creation_with_key() {
        assert!(LlmClient::new("gsk_test".to_string()).is_ok());
    }
}
