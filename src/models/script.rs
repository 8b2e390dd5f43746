use serde::{Deserialize, Serialize};
use std::path::Path;

/// Input for script generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptInput {
    pub topic: String,
    /// Outline such as "문제점 → 해결책 → 실천".
    pub storyline: String,
    pub duration_minutes: u32,
    pub tone: String,
    pub language: String,
}

impl ScriptInput {
    pub fn new(topic: impl Into<String>, storyline: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            storyline: storyline.into(),
            duration_minutes: 10,
            tone: "친근하고 설득력 있는".to_string(),
            language: "ko".to_string(),
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    /// Split the storyline into its ordered segments.
    ///
    /// Segments are separated by arrows (`→`, `->`, `>`) or line breaks.
    /// Leading list markers ("1.", "-", "*") are stripped.
    pub fn storyline_segments(&self) -> Vec<String> {
        self.storyline
            .replace("->", "→")
            .split(['→', '>', '\n'])
            .map(|s| {
                s.trim()
                    .trim_start_matches(|c: char| {
                        c.is_ascii_digit() || c == '.' || c == '-' || c == '*' || c == ')'
                    })
                    .trim()
                    .to_string()
            })
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// One narrative unit: narration for the voice track plus slide content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(rename = "section_id")]
    pub id: u32,
    /// Slide title.
    pub title: String,
    /// Full narration read while the slide is shown.
    #[serde(rename = "content")]
    pub narration: String,
    #[serde(rename = "key_points", default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub slide_notes: String,
    #[serde(default)]
    pub estimated_duration_sec: f64,
}

/// Complete script, persisted as the `script` stage's JSON artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "sections", default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub total_duration_sec: f64,
}

impl Script {
    /// Recompute `total_duration_sec` from the scene estimates.
    pub fn calculate_total_duration(&mut self) -> f64 {
        self.total_duration_sec = self.scenes.iter().map(|s| s.estimated_duration_sec).sum();
        self.total_duration_sec
    }

    /// All narration joined with blank lines.
    pub fn to_full_text(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.narration.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn scene(&self, id: u32) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn load(path: &Path) -> Result<Self, crate::Error> {
        super::read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), crate::Error> {
        super::write_json(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(id: u32, narration: &str, secs: f64) -> Scene {
        Scene {
            id,
            title: format!("섹션 {}", id),
            narration: narration.to_string(),
            bullets: vec![],
            slide_notes: String::new(),
            estimated_duration_sec: secs,
        }
    }

    #[test]
    fn test_total_duration() {
        let mut script = Script {
            title: "테스트 스크립트".to_string(),
            description: String::new(),
            scenes: (1..=3).map(|i| scene(i, "내용", 30.0)).collect(),
            tags: vec![],
            total_duration_sec: 0.0,
        };
        assert_eq!(script.calculate_total_duration(), 90.0);
        assert_eq!(script.total_duration_sec, 90.0);
    }

    #[test]
    fn test_full_text_and_lookup() {
        let script = Script {
            title: "테스트".to_string(),
            description: String::new(),
            scenes: vec![scene(1, "첫 번째 내용", 0.0), scene(2, "두 번째 내용", 0.0)],
            tags: vec![],
            total_duration_sec: 0.0,
        };
        assert_eq!(script.to_full_text(), "첫 번째 내용\n\n두 번째 내용");
        assert_eq!(script.scene(2).map(|s| s.title.as_str()), Some("섹션 2"));
        assert!(script.scene(999).is_none());
    }

    #[test]
    fn test_json_uses_section_field_names() {
        let json = r#"{
            "title": "시간 관리",
            "sections": [
                {"section_id": 1, "title": "인트로", "content": "안녕하세요", "key_points": ["a", "b"]}
            ]
        }"#;
        let script: Script = serde_json::from_str(json).unwrap();
        assert_eq!(script.scenes.len(), 1);
        assert_eq!(script.scenes[0].narration, "안녕하세요");
        assert_eq!(script.scenes[0].bullets, vec!["a", "b"]);

        let back = serde_json::to_value(&script).unwrap();
        assert_eq!(back["sections"][0]["content"], "안녕하세요");
        assert_eq!(back["sections"][0]["section_id"], 1);
    }

    #[test]
    fn test_storyline_segments() {
        let input = ScriptInput::new("시간 관리의 중요성", "문제점 → 해결책 → 실천");
        assert_eq!(input.storyline_segments(), vec!["문제점", "해결책", "실천"]);

        let input = ScriptInput::new("t", "1. intro\n2. body\n3. outro");
        assert_eq!(input.storyline_segments(), vec!["intro", "body", "outro"]);

        let input = ScriptInput::new("t", "problem -> fix");
        assert_eq!(input.storyline_segments(), vec!["problem", "fix"]);
    }
}
