//! Configuration file handling for contents-autouploader.
//!
//! Settings come from a YAML file (`config/config.yaml`, `config.yaml` or
//! `~/.config/contents-autouploader/config.yaml`, or a custom path via
//! `--config`). API keys and OAuth client credentials come from the
//! environment, optionally seeded from a `.env` file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Application name used for config, cache and credential directories.
pub const APP_NAME: &str = "contents-autouploader";

pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const ELEVENLABS_API_KEY_ENV: &str = "ELEVENLABS_API_KEY";
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const YOUTUBE_CLIENT_ID_ENV: &str = "YOUTUBE_CLIENT_ID";
pub const YOUTUBE_CLIENT_SECRET_ENV: &str = "YOUTUBE_CLIENT_SECRET";

/// Top-level settings structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ai: AiSettings,
    pub script: ScriptSettings,
    pub presentation: PresentationSettings,
    pub tts: TtsSettings,
    pub video: VideoSettings,
    pub youtube: YouTubeSettings,
    pub output: OutputSettings,
    /// Secrets are never read from or written to the YAML file.
    #[serde(skip)]
    pub keys: ApiKeys,
}

/// Which LLM backs script generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProviderKind {
    #[default]
    Claude,
    OpenAi,
    Ollama,
}

impl AiProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProviderKind::Claude => "claude",
            AiProviderKind::OpenAi => "openai",
            AiProviderKind::Ollama => "ollama",
        }
    }
}

impl fmt::Display for AiProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "claude" => Ok(AiProviderKind::Claude),
            "openai" => Ok(AiProviderKind::OpenAi),
            "ollama" => Ok(AiProviderKind::Ollama),
            other => Err(ConfigError::UnknownProvider {
                kind: "AI",
                name: other.to_string(),
            }),
        }
    }
}

/// Which speech synthesis backend narrates the scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProviderKind {
    ElevenLabs,
    Google,
    #[default]
    OpenAi,
    Local,
}

impl TtsProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsProviderKind::ElevenLabs => "elevenlabs",
            TtsProviderKind::Google => "google",
            TtsProviderKind::OpenAi => "openai",
            TtsProviderKind::Local => "local",
        }
    }

    /// File extension of the audio this provider writes.
    pub fn audio_extension(&self) -> &'static str {
        match self {
            TtsProviderKind::Local => "wav",
            _ => "mp3",
        }
    }
}

impl fmt::Display for TtsProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TtsProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "elevenlabs" => Ok(TtsProviderKind::ElevenLabs),
            "google" => Ok(TtsProviderKind::Google),
            "openai" => Ok(TtsProviderKind::OpenAi),
            "local" => Ok(TtsProviderKind::Local),
            other => Err(ConfigError::UnknownProvider {
                kind: "TTS",
                name: other.to_string(),
            }),
        }
    }
}

/// YouTube visibility of an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    #[default]
    Private,
    Unlisted,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Private => "private",
            PrivacyStatus::Unlisted => "unlisted",
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub provider: AiProviderKind,
    pub claude: LlmEndpoint,
    pub openai: LlmEndpoint,
    pub ollama: LlmEndpoint,
}

impl AiSettings {
    /// Endpoint settings for the given provider.
    pub fn endpoint(&self, kind: AiProviderKind) -> &LlmEndpoint {
        match kind {
            AiProviderKind::Claude => &self.claude,
            AiProviderKind::OpenAi => &self.openai,
            AiProviderKind::Ollama => &self.ollama,
        }
    }
}

/// Connection settings for one LLM provider.
///
/// Fields left out of the YAML fall back to the provider's defaults, so the
/// defaults are filled in after parsing by [`Settings::apply_endpoint_defaults`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmEndpoint {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

pub const DEFAULT_CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    pub default_duration: u32,
    pub default_tone: String,
    pub language: String,
    /// Reuse LLM responses for identical prompts.
    pub cache: bool,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            default_duration: 10,
            default_tone: "친근하고 설득력 있는".to_string(),
            language: "ko".to_string(),
            cache: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationSettings {
    pub width: u32,
    pub height: u32,
    pub title_font_size: u32,
    pub body_font_size: u32,
    pub background_color: String,
    pub title_color: String,
    pub body_color: String,
    pub accent_color: String,
    /// TrueType/OpenType font used for slide images.
    pub font_path: Option<PathBuf>,
    /// Prepend a title slide before the scene slides.
    pub title_slide: bool,
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            title_font_size: 44,
            body_font_size: 28,
            background_color: "#FFFFFF".to_string(),
            title_color: "#1a1a2e".to_string(),
            body_color: "#333333".to_string(),
            accent_color: "#4a90d9".to_string(),
            font_path: None,
            title_slide: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSettings {
    pub provider: TtsProviderKind,
    pub elevenlabs: ElevenLabsSettings,
    pub google: GoogleTtsSettings,
    pub openai: OpenAiTtsSettings,
    pub local: LocalTtsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevenLabsSettings {
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for ElevenLabsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".to_string(),
            voice_id: "pNInz6obpgDQGcFmaJgB".to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleTtsSettings {
    pub base_url: String,
    pub language_code: String,
    pub voice_name: String,
    pub speaking_rate: f32,
    pub pitch: f32,
}

impl Default for GoogleTtsSettings {
    fn default() -> Self {
        Self {
            base_url: "https://texttospeech.googleapis.com".to_string(),
            language_code: "ko-KR".to_string(),
            voice_name: "ko-KR-Neural2-C".to_string(),
            speaking_rate: 1.0,
            pitch: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiTtsSettings {
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub speed: f32,
}

impl Default for OpenAiTtsSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: "tts-1-hd".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalTtsSettings {
    /// Speech engine executable (espeak-ng compatible flags).
    pub command: String,
    /// Words per minute.
    pub rate: u32,
    /// 0.0 to 1.0
    pub volume: f32,
    pub voice_id: Option<String>,
}

impl Default for LocalTtsSettings {
    fn default() -> Self {
        Self {
            command: "espeak-ng".to_string(),
            rate: 150,
            volume: 1.0,
            voice_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub audio_codec: String,
    pub bitrate: String,
    /// Fade length in seconds at slide boundaries.
    pub transition_duration: f64,
    /// Silence appended after each scene's narration, in seconds.
    pub slide_padding: f64,
    /// How long the optional title slide stays on screen.
    pub title_duration: f64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            bitrate: "8000k".to_string(),
            transition_duration: 0.5,
            slide_padding: 0.5,
            title_duration: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeSettings {
    pub privacy_status: PrivacyStatus,
    pub category_id: String,
    pub default_tags: Vec<String>,
    pub auth_uri: String,
    pub token_uri: String,
    pub upload_base_url: String,
    pub api_base_url: String,
    pub redirect_port: u16,
    /// Resumable upload chunk size in bytes (multiple of 256 KiB).
    pub chunk_size: usize,
    pub max_retries: u32,
}

impl Default for YouTubeSettings {
    fn default() -> Self {
        Self {
            privacy_status: PrivacyStatus::Private,
            category_id: "27".to_string(),
            default_tags: vec![
                "교육".to_string(),
                "강의".to_string(),
                "자기계발".to_string(),
            ],
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            upload_base_url: "https://www.googleapis.com".to_string(),
            api_base_url: "https://www.googleapis.com".to_string(),
            redirect_port: 8080,
            chunk_size: 1024 * 1024,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub base_dir: PathBuf,
    pub keep_intermediate: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("output"),
            keep_intermediate: true,
        }
    }
}

/// Secrets read from the environment.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub google: Option<String>,
    pub youtube_client_id: Option<String>,
    pub youtube_client_secret: Option<String>,
}

impl ApiKeys {
    /// Read every key from the process environment. Empty values count as unset.
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        Self {
            anthropic: var(ANTHROPIC_API_KEY_ENV),
            openai: var(OPENAI_API_KEY_ENV),
            elevenlabs: var(ELEVENLABS_API_KEY_ENV),
            google: var(GOOGLE_API_KEY_ENV),
            youtube_client_id: var(YOUTUBE_CLIENT_ID_ENV),
            youtube_client_secret: var(YOUTUBE_CLIENT_SECRET_ENV),
        }
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn mask(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "set"
            } else {
                "unset"
            }
        }
        f.debug_struct("ApiKeys")
            .field("anthropic", &mask(&self.anthropic))
            .field("openai", &mask(&self.openai))
            .field("elevenlabs", &mask(&self.elevenlabs))
            .field("google", &mask(&self.google))
            .field("youtube_client_id", &mask(&self.youtube_client_id))
            .field("youtube_client_secret", &mask(&self.youtube_client_secret))
            .finish()
    }
}

impl Settings {
    /// Load settings from an explicit path, or from the first default
    /// location that exists. Falls back to built-in defaults when no file is
    /// found. An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound {
                        path: p.to_path_buf(),
                    });
                }
                Self::from_file(p)?
            }
            None => match search_paths().into_iter().find(|p| p.exists()) {
                Some(found) => {
                    log::debug!("Using config file {}", found.display());
                    Self::from_file(&found)?
                }
                None => Settings::default(),
            },
        };
        settings.keys = ApiKeys::from_env();
        Ok(settings)
    }

    /// Parse a YAML file. Keys are left empty.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { source, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse settings from YAML text. An empty document yields the defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = if content.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
                path: PathBuf::new(),
                source: e,
            })?
        };
        settings.apply_endpoint_defaults();
        Ok(settings)
    }

    /// Fill unset LLM endpoint fields with each provider's defaults.
    pub fn apply_endpoint_defaults(&mut self) {
        fill(
            &mut self.ai.claude,
            DEFAULT_CLAUDE_BASE_URL,
            DEFAULT_CLAUDE_MODEL,
        );
        fill(
            &mut self.ai.openai,
            DEFAULT_OPENAI_BASE_URL,
            DEFAULT_OPENAI_MODEL,
        );
        fill(
            &mut self.ai.ollama,
            DEFAULT_OLLAMA_BASE_URL,
            DEFAULT_OLLAMA_MODEL,
        );

        fn fill(endpoint: &mut LlmEndpoint, base_url: &str, model: &str) {
            endpoint.base_url.get_or_insert_with(|| base_url.to_string());
            endpoint.model.get_or_insert_with(|| model.to_string());
            endpoint.max_tokens.get_or_insert(DEFAULT_MAX_TOKENS);
        }
    }

    /// Render the effective settings (without secrets) as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError {
            path: PathBuf::new(),
            source: e,
        })
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    NotFound {
        path: PathBuf,
    },
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    UnknownProvider {
        kind: &'static str,
        name: String,
    },
    AlreadyExists {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "Config file '{}' does not exist", path.display())
            }
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                if path.as_os_str().is_empty() {
                    write!(f, "Failed to parse config: {}", source)
                } else {
                    write!(
                        f,
                        "Failed to parse config file '{}': {}",
                        path.display(),
                        source
                    )
                }
            }
            ConfigError::UnknownProvider { kind, name } => {
                write!(f, "Unknown {} provider: {}", kind, name)
            }
            ConfigError::AlreadyExists { path } => {
                write!(f, "Config file already exists: {}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Get the default config file path in the user's config directory.
pub fn default_path() -> PathBuf {
    app_config_dir().join("config.yaml")
}

/// `~/.config/contents-autouploader` (or the platform equivalent).
pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config")
        })
        .join(APP_NAME)
}

/// Locations probed, in order, when no `--config` is given.
pub fn search_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("config/config.yaml"),
        PathBuf::from("config.yaml"),
        default_path(),
    ]
}

/// Write the commented default config to `path`. Refuses to overwrite.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    let io_err = |source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(io_err)
}

/// Commented template written by `config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r##"# contents-autouploader configuration
#
# API keys are read from the environment (or a .env file):
#   ANTHROPIC_API_KEY, OPENAI_API_KEY, ELEVENLABS_API_KEY, GOOGLE_API_KEY,
#   YOUTUBE_CLIENT_ID, YOUTUBE_CLIENT_SECRET

ai:
  # claude, openai or ollama
  provider: claude
  claude:
    model: claude-sonnet-4-20250514
    max_tokens: 8192
  openai:
    model: gpt-4o
  ollama:
    base_url: http://localhost:11434/v1
    model: llama3.2

script:
  default_duration: 10
  default_tone: 친근하고 설득력 있는
  language: ko
  cache: true

presentation:
  width: 1920
  height: 1080
  title_font_size: 44
  body_font_size: 28
  background_color: "#FFFFFF"
  title_color: "#1a1a2e"
  body_color: "#333333"
  accent_color: "#4a90d9"
  # font_path: /usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc
  title_slide: false

tts:
  # elevenlabs, google, openai or local
  provider: openai
  openai:
    model: tts-1-hd
    voice: alloy
    speed: 1.0
  local:
    command: espeak-ng
    rate: 150
    volume: 1.0

video:
  fps: 30
  codec: libx264
  audio_codec: aac
  bitrate: 8000k
  transition_duration: 0.5
  slide_padding: 0.5

youtube:
  # public, private or unlisted
  privacy_status: private
  category_id: "27"

output:
  base_dir: output
  keep_intermediate: true
"##;
