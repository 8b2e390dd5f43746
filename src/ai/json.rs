//! Lenient JSON extraction from model output.

use serde_json::Value;

use super::GenerationError;

/// Parse a JSON object out of a model response.
///
/// Tries, in order: the raw text, the text with Markdown code fences
/// (```` ``` ```` or ```` ```json ````) removed, and the span between the
/// first `{` and the last `}`.
pub fn extract_json(response: &str) -> Result<Value, GenerationError> {
    if let Ok(value) = serde_json::from_str(response) {
        return Ok(value);
    }

    if let Some(inner) = strip_code_fence(response) {
        if let Ok(value) = serde_json::from_str(inner) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str(&response[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(GenerationError::UnparsableResponse(preview(response)))
}

fn strip_code_fence(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    let rest = trimmed.strip_prefix("```")?.trim_start();
    let rest = rest.strip_prefix("json").unwrap_or(rest).trim_start();
    Some(rest.strip_suffix("```").unwrap_or(rest).trim_end())
}

/// First 200 characters, for error messages.
fn preview(response: &str) -> String {
    let mut out: String = response.chars().take(200).collect();
    if response.chars().count() > 200 {
        out.push_str("...");
    }
    out
}
