use std::path::Path;

use serde::Serialize;

use super::{error_from_response, SynthesisError};
use crate::config::OpenAiTtsSettings;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    speed: f32,
    response_format: &'static str,
}

/// OpenAI `/audio/speech`, MP3 output.
pub struct OpenAiTtsClient {
    api_key: String,
    settings: OpenAiTtsSettings,
    http_client: reqwest::Client,
}

impl OpenAiTtsClient {
    pub fn new(api_key: String, settings: OpenAiTtsSettings) -> Result<Self, SynthesisError> {
        if api_key.trim().is_empty() {
            return Err(SynthesisError::MissingApiKey {
                provider: "openai",
                env: crate::config::OPENAI_API_KEY_ENV,
            });
        }
        Ok(Self {
            api_key,
            settings,
            http_client: super::http_client()?,
        })
    }

    pub async fn synthesize(&self, text: &str, output: &Path) -> Result<u64, SynthesisError> {
        let url = format!("{}/audio/speech", self.settings.base_url.trim_end_matches('/'));
        let body = SpeechRequest {
            model: &self.settings.model,
            voice: &self.settings.voice,
            input: text,
            speed: self.settings.speed,
            response_format: "mp3",
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response("openai", response).await);
        }
        super::stream_to_file(response, output).await
    }
}
