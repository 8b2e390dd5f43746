//! CLI enum types for provider and privacy options.

use clap::ValueEnum;

use crate::config::{AiProviderKind, PrivacyStatus, TtsProviderKind};

/// LLM used for script generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AiProvider {
    Claude,
    Openai,
    Ollama,
}

impl From<AiProvider> for AiProviderKind {
    fn from(p: AiProvider) -> Self {
        match p {
            AiProvider::Claude => AiProviderKind::Claude,
            AiProvider::Openai => AiProviderKind::OpenAi,
            AiProvider::Ollama => AiProviderKind::Ollama,
        }
    }
}

/// Speech backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TtsProvider {
    Elevenlabs,
    Google,
    Openai,
    Local,
}

impl From<TtsProvider> for TtsProviderKind {
    fn from(p: TtsProvider) -> Self {
        match p {
            TtsProvider::Elevenlabs => TtsProviderKind::ElevenLabs,
            TtsProvider::Google => TtsProviderKind::Google,
            TtsProvider::Openai => TtsProviderKind::OpenAi,
            TtsProvider::Local => TtsProviderKind::Local,
        }
    }
}

/// YouTube visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Privacy {
    Public,
    Private,
    Unlisted,
}

impl From<Privacy> for PrivacyStatus {
    fn from(p: Privacy) -> Self {
        match p {
            Privacy::Public => PrivacyStatus::Public,
            Privacy::Private => PrivacyStatus::Private,
            Privacy::Unlisted => PrivacyStatus::Unlisted,
        }
    }
}
