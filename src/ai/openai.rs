//! OpenAiClient - chat completions API, used for OpenAI and for Ollama's
//! OpenAI-compatible endpoint.

use serde::{Deserialize, Serialize};

use super::{error_from_response, http_client, GenerationError};
use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
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
    content: Option<String>,
}

/// Client for `/chat/completions`.
pub struct OpenAiClient {
    /// Provider name used in errors and logs ("openai" or "ollama").
    provider: &'static str,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    /// Create an OpenAI client with an explicit API key.
    pub fn with_api_key(api_key: String) -> Result<Self, GenerationError> {
        Self::with_base_url(api_key, DEFAULT_OPENAI_BASE_URL.to_string())
    }

    /// Create an OpenAI client against a custom base URL.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingApiKey {
                provider: "openai",
                env: crate::config::OPENAI_API_KEY_ENV,
            });
        }
        Self::build("openai", Some(api_key), base_url)
    }

    /// Create a client for a local Ollama server. No key is needed.
    pub fn ollama(base_url: String) -> Result<Self, GenerationError> {
        Self::build("ollama", None, base_url)
    }

    fn build(
        provider: &'static str,
        api_key: Option<String>,
        base_url: String,
    ) -> Result<Self, GenerationError> {
        Ok(Self {
            provider,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
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

    /// Send one chat completion. With `json_mode` the request asks for a
    /// JSON object response (OpenAI only; Ollama ignores the flag).
    pub async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        json_mode: bool,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages,
            response_format: (json_mode && self.provider == "openai").then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        log::debug!("POST {} (model {})", url, self.model);
        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_connect() && self.provider == "ollama" => {
                return Err(GenerationError::ProviderUnavailable {
                    provider: "ollama",
                    message: format!(
                        "cannot connect to {}. Is 'ollama serve' running?",
                        self.base_url
                    ),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !response.status().is_success() {
            return Err(error_from_response(self.provider, response).await);
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse {
                provider: self.provider,
            });
        }
        Ok(text)
    }
}
