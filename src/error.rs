//! Crate-level error type.
//!
//! Every stage has its own error enum; `Error` wraps them so the CLI can
//! propagate any of them with `?`.

use thiserror::Error;

use crate::ai::GenerationError;
use crate::config::ConfigError;
use crate::slides::RenderError;
use crate::sync::SyncError;
use crate::tts::SynthesisError;
use crate::video::EncodingError;
use crate::youtube::{AuthError, UploadError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A stage input that must exist on disk is missing.
    #[error("{what} not found: {path}")]
    MissingInput {
        what: &'static str,
        path: std::path::PathBuf,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
