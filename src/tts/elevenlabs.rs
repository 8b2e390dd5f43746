use std::path::Path;

use serde::Serialize;

use super::{error_from_response, SynthesisError};
use crate::config::ElevenLabsSettings;

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// ElevenLabs text-to-speech, MP3 output.
pub struct ElevenLabsClient {
    api_key: String,
    settings: ElevenLabsSettings,
    http_client: reqwest::Client,
}

impl ElevenLabsClient {
    pub fn new(api_key: String, settings: ElevenLabsSettings) -> Result<Self, SynthesisError> {
        if api_key.trim().is_empty() {
            return Err(SynthesisError::MissingApiKey {
                provider: "elevenlabs",
                env: crate::config::ELEVENLABS_API_KEY_ENV,
            });
        }
        Ok(Self {
            api_key,
            settings,
            http_client: super::http_client()?,
        })
    }

    /// Synthesize `text` and stream the MP3 into `output`. Returns bytes written.
    pub async fn synthesize(&self, text: &str, output: &Path) -> Result<u64, SynthesisError> {
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.voice_id
        );
        let body = SpeechRequest {
            text,
            model_id: &self.settings.model_id,
            voice_settings: VoiceSettings {
                stability: self.settings.stability,
                similarity_boost: self.settings.similarity_boost,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response("elevenlabs", response).await);
        }
        super::stream_to_file(response, output).await
    }
}
