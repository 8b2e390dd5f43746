//! Narration synthesis: one audio file per scene.

mod duration;
mod elevenlabs;
mod google;
mod local;
mod openai;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use duration::{compressed_duration, probe_duration, wav_duration};
pub use elevenlabs::ElevenLabsClient;
pub use google::GoogleTtsClient;
pub use local::LocalEngine;
pub use openai::OpenAiTtsClient;

use crate::config::{Settings, TtsProviderKind};
use crate::interrupt::{ctrlc_received, sleep_unless_interrupted};
use crate::models::{AudioSegment, Scene, Script};
use crate::retry::{is_retryable_status, is_transient_network_error, parse_retry_after, RetryPolicy};

/// Default timeout for synthesis requests (120 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("{provider} API key not configured (set {env})")]
    MissingApiKey {
        provider: &'static str,
        env: &'static str,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{provider} TTS error ({status}): {message}")]
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

    #[error("Unexpected {provider} response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("TTS engine '{command}' not found. Install it or set tts.local.command")]
    EngineNotFound { command: String },

    #[error("TTS engine '{command}' failed (exit code {exit_code:?}): {stderr}")]
    EngineFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Cannot read audio '{}': {message}", .path.display())]
    Probe { path: PathBuf, message: String },

    #[error("Scene {scene_id} has no narration")]
    EmptyText { scene_id: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interrupted")]
    Interrupted,

    #[error("Synthesis failed for scene {scene_id}: {source}")]
    Scene {
        scene_id: u32,
        #[source]
        source: Box<SynthesisError>,
    },
}

impl SynthesisError {
    fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::RateLimit { .. } => true,
            SynthesisError::HttpError(e) => is_transient_network_error(e),
            SynthesisError::ApiError { status, .. } => reqwest::StatusCode::from_u16(*status)
                .map(is_retryable_status)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            SynthesisError::RateLimit {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

fn http_client() -> Result<reqwest::Client, SynthesisError> {
    Ok(reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()?)
}

async fn error_from_response(provider: &'static str, response: reqwest::Response) -> SynthesisError {
    let status = response.status();
    let retry_after_secs = parse_retry_after(&response);
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        log::warn!("Rate limited by {}. Retry-After: {:?} seconds", provider, retry_after_secs);
        return SynthesisError::RateLimit {
            provider,
            message,
            retry_after_secs,
        };
    }
    SynthesisError::ApiError {
        provider,
        status: status.as_u16(),
        message,
    }
}

/// Stream a successful audio response body to disk.
async fn stream_to_file(response: reqwest::Response, output: &Path) -> Result<u64, SynthesisError> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let mut file = tokio::fs::File::create(output).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// The configured speech backend.
pub enum TtsProvider {
    ElevenLabs(ElevenLabsClient),
    Google(GoogleTtsClient),
    OpenAi(OpenAiTtsClient),
    Local(LocalEngine),
}

impl TtsProvider {
    /// Build the provider named by `provider`, or `tts.provider` from settings.
    ///
    /// # Errors
    ///
    /// Returns `SynthesisError::MissingApiKey` when a cloud provider's key is
    /// not set. No request is made.
    pub fn from_settings(
        settings: &Settings,
        provider: Option<TtsProviderKind>,
    ) -> Result<Self, SynthesisError> {
        let keys = &settings.keys;
        let tts = &settings.tts;
        Ok(match provider.unwrap_or(tts.provider) {
            TtsProviderKind::ElevenLabs => TtsProvider::ElevenLabs(ElevenLabsClient::new(
                keys.elevenlabs.clone().unwrap_or_default(),
                tts.elevenlabs.clone(),
            )?),
            TtsProviderKind::Google => TtsProvider::Google(GoogleTtsClient::new(
                keys.google.clone().unwrap_or_default(),
                tts.google.clone(),
            )?),
            TtsProviderKind::OpenAi => TtsProvider::OpenAi(OpenAiTtsClient::new(
                keys.openai.clone().unwrap_or_default(),
                tts.openai.clone(),
            )?),
            TtsProviderKind::Local => TtsProvider::Local(LocalEngine::new(tts.local.clone())),
        })
    }

    pub fn kind(&self) -> TtsProviderKind {
        match self {
            TtsProvider::ElevenLabs(_) => TtsProviderKind::ElevenLabs,
            TtsProvider::Google(_) => TtsProviderKind::Google,
            TtsProvider::OpenAi(_) => TtsProviderKind::OpenAi,
            TtsProvider::Local(_) => TtsProviderKind::Local,
        }
    }

    /// File extension of the audio this provider produces.
    pub fn extension(&self) -> &'static str {
        self.kind().audio_extension()
    }

    /// Synthesize `text` into `output`.
    ///
    /// Audio is written to a `.part` file next to `output` and renamed once
    /// complete, so a failed or cut-off request never leaves a truncated
    /// file where a later run would reuse it.
    pub async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SynthesisError> {
        let partial = partial_path(output);
        let result = match self.synthesize_into(text, &partial).await {
            Ok(()) => tokio::fs::rename(&partial, output)
                .await
                .map_err(SynthesisError::from),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&partial).await;
        }
        result
    }

    async fn synthesize_into(&self, text: &str, output: &Path) -> Result<(), SynthesisError> {
        let written = match self {
            TtsProvider::ElevenLabs(c) => c.synthesize(text, output).await?,
            TtsProvider::OpenAi(c) => c.synthesize(text, output).await?,
            TtsProvider::Google(c) => {
                let bytes = c.synthesize(text).await?;
                tokio::fs::write(output, &bytes).await?;
                bytes.len() as u64
            }
            TtsProvider::Local(engine) => return engine.synthesize(text, output).await,
        };

        if written == 0 {
            return Err(SynthesisError::InvalidResponse {
                provider: self.kind().as_str(),
                message: "empty audio body".to_string(),
            });
        }
        Ok(())
    }
}

/// `section_001.mp3` -> `section_001.part.mp3`. The extension is kept for
/// engines that pick the format from it.
fn partial_path(output: &Path) -> PathBuf {
    match output.extension() {
        Some(ext) => output.with_extension(format!("part.{}", ext.to_string_lossy())),
        None => output.with_extension("part"),
    }
}

/// File name for a scene's narration, e.g. `section_003.mp3`.
pub fn scene_file_name(scene_id: u32, extension: &str) -> String {
    format!("section_{:03}.{}", scene_id, extension)
}

/// Rebuild the segment set from files already in `dir`.
///
/// For each scene, `section_{id:03}.mp3` is preferred over `.wav`. Scenes
/// without a file are skipped; the sync step reports them.
pub fn load_segments(script: &Script, dir: &Path) -> Result<Vec<AudioSegment>, SynthesisError> {
    let mut segments = Vec::with_capacity(script.scenes.len());
    for scene in &script.scenes {
        let found = ["mp3", "wav"]
            .iter()
            .map(|ext| dir.join(scene_file_name(scene.id, ext)))
            .find(|p| p.exists());

        match found {
            Some(path) => {
                let duration = probe_duration(&path)?;
                segments.push(AudioSegment {
                    scene_id: scene.id,
                    path,
                    duration,
                });
            }
            None => log::warn!("No audio for scene {} in {}", scene.id, dir.display()),
        }
    }
    Ok(segments)
}

/// Synthesizes narration for scenes and whole scripts.
pub struct TtsGenerator {
    provider: TtsProvider,
    retry: RetryPolicy,
}

impl TtsGenerator {
    pub fn new(provider: TtsProvider) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn provider(&self) -> &TtsProvider {
        &self.provider
    }

    async fn synthesize_with_retry(&self, text: &str, output: &Path) -> Result<(), SynthesisError> {
        let max_retries = self.retry.max_retries;
        let mut attempt = 0u32;
        loop {
            if ctrlc_received() {
                return Err(SynthesisError::Interrupted);
            }
            match self.provider.synthesize(text, output).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    let delay = self.retry.delay(attempt, e.retry_after_secs());
                    log::info!(
                        "TTS request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        max_retries + 1,
                        e,
                        delay
                    );
                    if !sleep_unless_interrupted(delay).await {
                        return Err(SynthesisError::Interrupted);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Synthesize one scene into `dir/section_{id:03}.{ext}`.
    pub async fn generate_for_scene(
        &self,
        scene: &Scene,
        dir: &Path,
    ) -> Result<AudioSegment, SynthesisError> {
        if scene.narration.trim().is_empty() {
            return Err(SynthesisError::EmptyText { scene_id: scene.id });
        }
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(scene_file_name(scene.id, self.provider.extension()));
        self.synthesize_with_retry(&scene.narration, &path).await?;
        let duration = probe_duration(&path)?;

        log::info!(
            "Scene {} narrated: {} ({:.1}s)",
            scene.id,
            path.display(),
            duration
        );
        Ok(AudioSegment {
            scene_id: scene.id,
            path,
            duration,
        })
    }

    /// Synthesize every scene in order.
    ///
    /// Stops at the first failing scene and returns
    /// `SynthesisError::Scene`; files already written are left in place.
    pub async fn generate_for_script(
        &self,
        script: &Script,
        dir: &Path,
    ) -> Result<Vec<AudioSegment>, SynthesisError> {
        let mut segments = Vec::with_capacity(script.scenes.len());
        for (i, scene) in script.scenes.iter().enumerate() {
            if ctrlc_received() {
                return Err(SynthesisError::Interrupted);
            }
            log::info!(
                "Synthesizing scene {}/{} with {}",
                i + 1,
                script.scenes.len(),
                self.provider.kind()
            );
            let segment = self
                .generate_for_scene(scene, dir)
                .await
                .map_err(|e| SynthesisError::Scene {
                    scene_id: scene.id,
                    source: Box::new(e),
                })?;
            segments.push(segment);
        }
        Ok(segments)
    }

    /// Synthesize the whole narration into one file. The extension of
    /// `output` is replaced with the provider's.
    pub async fn generate_full_audio(
        &self,
        script: &Script,
        output: &Path,
    ) -> Result<AudioSegment, SynthesisError> {
        let text = script.to_full_text();
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyText { scene_id: 0 });
        }

        let path = output.with_extension(self.provider.extension());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.synthesize_with_retry(&text, &path).await?;
        let duration = probe_duration(&path)?;
        Ok(AudioSegment {
            scene_id: 0,
            path,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeys;

    fn settings(provider: TtsProviderKind, keys: ApiKeys) -> Settings {
        let mut settings = Settings::from_yaml_str("").unwrap();
        settings.tts.provider = provider;
        settings.keys = keys;
        settings
    }

    #[test]
    fn test_partial_path_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("audio/section_001.mp3")),
            PathBuf::from("audio/section_001.part.mp3")
        );
        assert_eq!(partial_path(Path::new("out")), PathBuf::from("out.part"));
    }

    #[test]
    fn test_missing_keys() {
        for (kind, name) in [
            (TtsProviderKind::ElevenLabs, "elevenlabs"),
            (TtsProviderKind::Google, "google"),
            (TtsProviderKind::OpenAi, "openai"),
        ] {
            let err = TtsProvider::from_settings(&settings(kind, ApiKeys::default()), None)
                .err()
                .unwrap();
            match err {
                SynthesisError::MissingApiKey { provider, .. } => assert_eq!(provider, name),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_local_needs_no_key() {
        let provider =
            TtsProvider::from_settings(&settings(TtsProviderKind::Local, ApiKeys::default()), None)
                .unwrap();
        assert_eq!(provider.kind(), TtsProviderKind::Local);
        assert_eq!(provider.extension(), "wav");
    }

    #[test]
    fn test_override_wins() {
        let keys = ApiKeys {
            openai: Some("k".into()),
            ..ApiKeys::default()
        };
        let provider = TtsProvider::from_settings(
            &settings(TtsProviderKind::ElevenLabs, keys),
            Some(TtsProviderKind::OpenAi),
        )
        .unwrap();
        assert_eq!(provider.kind(), TtsProviderKind::OpenAi);
        assert_eq!(provider.extension(), "mp3");
    }

    #[test]
    fn test_scene_file_name() {
        assert_eq!(scene_file_name(1, "mp3"), "section_001.mp3");
        assert_eq!(scene_file_name(12, "wav"), "section_012.wav");
    }

    #[test]
    fn test_retryable() {
        assert!(SynthesisError::ApiError {
            provider: "openai",
            status: 502,
            message: String::new()
        }
        .is_retryable());
        assert!(!SynthesisError::MissingApiKey {
            provider: "openai",
            env: "OPENAI_API_KEY"
        }
        .is_retryable());
    }
}
