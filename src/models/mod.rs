//! Data passed between pipeline stages.
//!
//! Every model round-trips through JSON so that each stage can be replayed
//! from the previous stage's file on disk.

mod presentation;
mod script;
mod timing;

pub use presentation::{Presentation, Slide};
pub use script::{Scene, Script, ScriptInput};
pub use timing::{AudioSegment, TimingEntry, TimingManifest};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Read a JSON artifact from disk.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, crate::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write a JSON artifact, creating parent directories as needed.
pub(crate) fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), crate::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}
