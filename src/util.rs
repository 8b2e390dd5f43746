//! Small filesystem and text helpers.

use std::path::{Path, PathBuf};

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

/// Create the parent directory of `path`, if it has one.
pub fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Turn arbitrary text (often Korean) into a safe file name.
///
/// Removes characters that are invalid on common filesystems, collapses
/// whitespace into underscores and truncates to at most `max_bytes` bytes
/// of UTF-8 without splitting a character. Filesystem name limits count
/// bytes, and a Hangul syllable takes three.
pub fn sanitize_filename(name: &str, max_bytes: usize) -> String {
    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID.contains(c) && (c.is_whitespace() || !c.is_control()))
        .collect();
    let underscored = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    let trimmed = underscored.trim_matches(|c| c == '.' || c == ' ');
    let mut end = trimmed.len().min(max_bytes);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &trimmed[..end];

    if truncated.is_empty() {
        "unnamed".to_string()
    } else {
        truncated.to_string()
    }
}

/// Byte budget for the sanitized part of generated file names. Leaves room
/// under the usual 255-byte limit for suffixes like `.timing.json`.
pub const MAX_FILENAME_LENGTH: usize = 200;

/// Format seconds as MM:SS.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Estimate how long narrating `text` takes, in seconds.
///
/// Hangul is read at roughly eight characters per second, Latin-script
/// words at 2.5 words per second.
pub fn estimate_speech_duration(text: &str) -> f64 {
    let hangul = text
        .chars()
        .filter(|c| ('\u{AC00}'..='\u{D7A3}').contains(c))
        .count();
    let latin_words = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .count();

    hangul as f64 / 8.0 + latin_words as f64 / 2.5
}
