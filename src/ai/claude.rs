//! ClaudeClient - Anthropic Messages API.

use serde::{Deserialize, Serialize};

use super::{error_from_response, http_client, GenerationError};
use crate::config::{DEFAULT_CLAUDE_BASE_URL, DEFAULT_CLAUDE_MODEL, DEFAULT_MAX_TOKENS};

/// API version header sent with every request.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Client for the Anthropic Messages API.
pub struct ClaudeClient {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl ClaudeClient {
    /// Create a client with an explicit API key.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::MissingApiKey` if the key is empty.
    pub fn with_api_key(api_key: String) -> Result<Self, GenerationError> {
        Self::with_base_url(api_key, DEFAULT_CLAUDE_BASE_URL.to_string())
    }

    /// Create a client against a custom base URL (e.g. a mock server).
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey {
                provider: "claude",
                env: crate::config::ANTHROPIC_API_KEY_ENV,
            });
        }

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_CLAUDE_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            http_client: http_client()?,
        })
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one completion request. No retries.
    pub async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        log::debug!("POST {} (model {})", url, self.model);
        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response("claude", response).await);
        }

        let parsed: MessagesResponse = response.json().await?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text" || block.kind.is_empty())
            .filter_map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse { provider: "claude" });
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        let result = ClaudeClient::with_api_key(String::new());
        assert!(matches!(
            result,
            Err(GenerationError::MissingApiKey { provider: "claude", .. })
        ));
    }

    #[test]
    fn test_defaults_and_builders() {
        let client = ClaudeClient::with_base_url("k".into(), "http://localhost:1/".into())
            .unwrap()
            .with_model("claude-test".into())
            .with_max_tokens(100);
        assert_eq!(client.base_url(), "http://localhost:1");
        assert_eq!(client.model(), "claude-test");
        assert_eq!(client.max_tokens, 100);
    }

    #[test]
    fn test_request_omits_missing_system() {
        let body = MessagesRequest {
            model: "m",
            max_tokens: 10,
            system: None,
            messages: vec![Message {
                role: "user",
                content: "hi",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
