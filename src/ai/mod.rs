//! LLM providers used by the script generator.
//!
//! `AiService` dispatches to Claude, OpenAI or a local Ollama server and
//! retries transient failures with the shared backoff helpers.

mod claude;
mod json;
mod openai;

use std::time::Duration;

pub use claude::{ClaudeClient, ANTHROPIC_VERSION};
pub use json::extract_json;
pub use openai::OpenAiClient;

use crate::config::{AiProviderKind, Settings, DEFAULT_MAX_TOKENS};
use crate::interrupt::{ctrlc_received, sleep_unless_interrupted};
use crate::retry::{is_retryable_status, is_transient_network_error, parse_retry_after, RetryPolicy};

/// Completions can take minutes for long scripts.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Appended to every prompt sent through [`AiService::generate_json`].
pub const JSON_ONLY_INSTRUCTION: &str =
    "IMPORTANT: Respond with valid JSON only. Do not include any text before or after the JSON.";

/// Errors from LLM providers.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{provider} API key not configured (set {env})")]
    MissingApiKey {
        provider: &'static str,
        env: &'static str,
    },

    #[error("{provider} is unavailable: {message}")]
    ProviderUnavailable {
        provider: &'static str,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {message}")]
    ApiError {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}: {message}")]
    RateLimit {
        provider: &'static str,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: &'static str },

    #[error("Could not parse JSON from response: {0}")]
    UnparsableResponse(String),

    #[error("Interrupted")]
    Interrupted,
}

impl GenerationError {
    /// Whether another attempt may succeed.
    fn is_retryable(&self) -> bool {
        match self {
            GenerationError::RateLimit { .. } => true,
            GenerationError::HttpError(e) => is_transient_network_error(e),
            GenerationError::ApiError { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GenerationError::RateLimit {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

fn http_client() -> Result<reqwest::Client, GenerationError> {
    Ok(reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()?)
}

/// Turn a non-success response into the matching error.
async fn error_from_response(provider: &'static str, response: reqwest::Response) -> GenerationError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = parse_retry_after(&response);
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Rate limit exceeded".to_string());
        log::warn!(
            "Rate limited by {}. Retry-After: {:?} seconds",
            provider,
            retry_after_secs
        );
        return GenerationError::RateLimit {
            provider,
            message,
            retry_after_secs,
        };
    }

    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    GenerationError::ApiError {
        provider,
        status: status.as_u16(),
        message,
    }
}

/// The configured LLM backend.
pub enum AiService {
    Claude(ClaudeClient),
    OpenAi(OpenAiClient),
    Ollama(OpenAiClient),
}

/// An [`AiService`] plus the retry policy applied to every call.
pub struct AiClient {
    service: AiService,
    retry: RetryPolicy,
}

impl AiService {
    /// Build the provider named by `provider`, or `ai.provider` from settings.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::MissingApiKey` when the provider needs a key
    /// that is not set. No request is made.
    pub fn from_settings(
        settings: &Settings,
        provider: Option<AiProviderKind>,
    ) -> Result<Self, GenerationError> {
        let kind = provider.unwrap_or(settings.ai.provider);
        let endpoint = settings.ai.endpoint(kind);
        let max_tokens = endpoint.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        let service = match kind {
            AiProviderKind::Claude => {
                let key = settings.keys.anthropic.clone().unwrap_or_default();
                let mut client = match &endpoint.base_url {
                    Some(url) => ClaudeClient::with_base_url(key, url.clone())?,
                    None => ClaudeClient::with_api_key(key)?,
                };
                if let Some(model) = &endpoint.model {
                    client = client.with_model(model.clone());
                }
                AiService::Claude(client.with_max_tokens(max_tokens))
            }
            AiProviderKind::OpenAi => {
                let key = settings.keys.openai.clone().unwrap_or_default();
                let mut client = match &endpoint.base_url {
                    Some(url) => OpenAiClient::with_base_url(key, url.clone())?,
                    None => OpenAiClient::with_api_key(key)?,
                };
                if let Some(model) = &endpoint.model {
                    client = client.with_model(model.clone());
                }
                AiService::OpenAi(client.with_max_tokens(max_tokens))
            }
            AiProviderKind::Ollama => {
                let base_url = endpoint
                    .base_url
                    .clone()
                    .unwrap_or_else(|| crate::config::DEFAULT_OLLAMA_BASE_URL.to_string());
                let model = endpoint
                    .model
                    .clone()
                    .unwrap_or_else(|| crate::config::DEFAULT_OLLAMA_MODEL.to_string());
                AiService::Ollama(
                    OpenAiClient::ollama(base_url)?
                        .with_model(model)
                        .with_max_tokens(max_tokens),
                )
            }
        };
        Ok(service)
    }

    pub fn kind(&self) -> AiProviderKind {
        match self {
            AiService::Claude(_) => AiProviderKind::Claude,
            AiService::OpenAi(_) => AiProviderKind::OpenAi,
            AiService::Ollama(_) => AiProviderKind::Ollama,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            AiService::Claude(c) => c.model(),
            AiService::OpenAi(c) | AiService::Ollama(c) => c.model(),
        }
    }

    async fn complete_once(
        &self,
        prompt: &str,
        system: Option<&str>,
        json_mode: bool,
    ) -> Result<String, GenerationError> {
        match self {
            AiService::Claude(c) => c.complete(prompt, system).await,
            AiService::OpenAi(c) | AiService::Ollama(c) => c.complete(prompt, system, json_mode).await,
        }
    }

    /// Wrap with the default retry policy.
    pub fn into_client(self) -> AiClient {
        AiClient::new(self, RetryPolicy::default())
    }
}

impl AiClient {
    pub fn new(service: AiService, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    pub fn service(&self) -> &AiService {
        &self.service
    }

    pub fn kind(&self) -> AiProviderKind {
        self.service.kind()
    }

    pub fn model(&self) -> &str {
        self.service.model()
    }

    /// Generate free text.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, GenerationError> {
        self.complete_with_retry(prompt, system, false).await
    }

    /// Generate and return the raw response text of a JSON-only request.
    ///
    /// The caller parses it with [`extract_json`]; keeping the raw text lets
    /// the script generator cache exactly what the model returned.
    pub async fn generate_json_text(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, GenerationError> {
        let json_prompt = format!("{}\n\n{}", prompt, JSON_ONLY_INSTRUCTION);
        self.complete_with_retry(&json_prompt, system, true).await
    }

    /// Generate a JSON value.
    pub async fn generate_json(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<serde_json::Value, GenerationError> {
        let text = self.generate_json_text(prompt, system).await?;
        extract_json(&text)
    }

    async fn complete_with_retry(
        &self,
        prompt: &str,
        system: Option<&str>,
        json_mode: bool,
    ) -> Result<String, GenerationError> {
        let max_retries = self.retry.max_retries;
        let mut attempt = 0u32;

        loop {
            if ctrlc_received() {
                return Err(GenerationError::Interrupted);
            }
            match self.service.complete_once(prompt, system, json_mode).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let delay = self.retry.delay(attempt, e.retry_after_secs());
                    log::info!(
                        "{} request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        self.service.kind(),
                        attempt + 1,
                        max_retries + 1,
                        e,
                        delay
                    );
                    if !sleep_unless_interrupted(delay).await {
                        return Err(GenerationError::Interrupted);
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        log::error!("Giving up after {} attempts: {}", attempt + 1, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
