use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{error_from_response, SynthesisError};
use crate::config::GoogleTtsSettings;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    speaking_rate: f32,
    pitch: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: Option<String>,
}

/// Google Cloud Text-to-Speech over REST with an API key.
pub struct GoogleTtsClient {
    api_key: String,
    settings: GoogleTtsSettings,
    http_client: reqwest::Client,
}

impl GoogleTtsClient {
    pub fn new(api_key: String, settings: GoogleTtsSettings) -> Result<Self, SynthesisError> {
        if api_key.trim().is_empty() {
            return Err(SynthesisError::MissingApiKey {
                provider: "google",
                env: crate::config::GOOGLE_API_KEY_ENV,
            });
        }
        Ok(Self {
            api_key,
            settings,
            http_client: super::http_client()?,
        })
    }

    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let url = format!(
            "{}/v1/text:synthesize",
            self.settings.base_url.trim_end_matches('/')
        );
        let body = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &self.settings.language_code,
                name: &self.settings.voice_name,
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: self.settings.speaking_rate,
                pitch: self.settings.pitch,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response("google", response).await);
        }

        let parsed: SynthesizeResponse = response.json().await?;
        let content = parsed.audio_content.ok_or_else(|| SynthesisError::InvalidResponse {
            provider: "google",
            message: "response has no audioContent".to_string(),
        })?;

        base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|e| SynthesisError::InvalidResponse {
                provider: "google",
                message: format!("audioContent is not valid base64: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uses_camel_case() {
        let body = SynthesizeRequest {
            input: SynthesisInput { text: "안녕" },
            voice: VoiceSelection {
                language_code: "ko-KR",
                name: "ko-KR-Neural2-C",
            },
            audio_config: AudioConfig {
                audio_encoding: "MP3",
                speaking_rate: 1.0,
                pitch: 0.0,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["voice"]["languageCode"], "ko-KR");
        assert_eq!(json["audioConfig"]["audioEncoding"], "MP3");
        assert_eq!(json["input"]["text"], "안녕");
    }
}
