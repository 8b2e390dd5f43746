//! Presentation generation: script -> slides -> `.pptx` deck and PNG frames.

mod pptx;
mod render;

use std::path::{Path, PathBuf};

pub use pptx::{read_deck, write_deck, EMU_PER_PIXEL};
pub use render::{load_font, wrap_text, SlideRenderer, SYSTEM_FONT_CANDIDATES};

use crate::config::PresentationSettings;
use crate::models::{Presentation, Scene, Script, Slide};

/// Max bullets derived from narration.
pub const MAX_DERIVED_BULLETS: usize = 5;

/// Max characters per derived bullet before truncation.
pub const MAX_BULLET_CHARS: usize = 60;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid .pptx archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("No usable font found (searched: {})", display_paths(.searched))]
    FontNotFound { searched: Vec<PathBuf> },

    #[error("Failed to load font '{}': {message}", .path.display())]
    InvalidFont { path: PathBuf, message: String },

    #[error("Invalid hex color: {0}")]
    InvalidColor(String),

    #[error("Malformed presentation: {0}")]
    MalformedDeck(String),

    #[error("Script has no sections to turn into slides")]
    EmptyScript,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse `#RRGGBB` (leading `#` optional).
pub fn parse_hex_color(hex: &str) -> Result<[u8; 3], RenderError> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(RenderError::InvalidColor(hex.to_string()));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).map_err(|_| RenderError::InvalidColor(hex.to_string()))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

/// Bullets for a scene: its key points, or up to five sentences taken from
/// the narration, each cut to 60 characters.
pub fn derive_bullets(scene: &Scene) -> Vec<String> {
    if !scene.bullets.is_empty() {
        return scene.bullets.clone();
    }

    scene
        .narration
        .split(['.', '!', '?', '。', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(MAX_DERIVED_BULLETS)
        .map(|sentence| {
            if sentence.chars().count() > MAX_BULLET_CHARS {
                let mut cut: String = sentence.chars().take(MAX_BULLET_CHARS).collect();
                cut.push('…');
                cut
            } else {
                sentence.to_string()
            }
        })
        .collect()
}

/// Builds decks and slide images from scripts.
pub struct PresentationGenerator {
    style: PresentationSettings,
}

impl PresentationGenerator {
    pub fn new(style: PresentationSettings) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &PresentationSettings {
        &self.style
    }

    /// Lay out slides for `script` without touching the disk.
    ///
    /// Scene `i` becomes content slide `i` (shifted by one when a title slide
    /// is enabled).
    pub fn build(&self, script: &Script) -> Result<Presentation, RenderError> {
        if script.scenes.is_empty() {
            return Err(RenderError::EmptyScript);
        }

        let mut slides = Vec::with_capacity(script.scenes.len() + 1);
        if self.style.title_slide {
            slides.push(Slide {
                index: 0,
                title: script.title.clone(),
                bullets: if script.description.is_empty() {
                    vec![]
                } else {
                    vec![script.description.clone()]
                },
                notes: format!("안녕하세요, 오늘은 {}에 대해 이야기해보겠습니다.", script.title),
                image_path: None,
            });
        }

        for scene in &script.scenes {
            slides.push(Slide {
                index: slides.len(),
                title: scene.title.clone(),
                bullets: derive_bullets(scene),
                notes: scene.narration.clone(),
                image_path: None,
            });
        }

        Ok(Presentation {
            title: script.title.clone(),
            slides,
            has_title_slide: self.style.title_slide,
            file_path: None,
        })
    }

    /// Build the deck for `script` and write it to `output`.
    pub fn generate(&self, script: &Script, output: &Path) -> Result<Presentation, RenderError> {
        let mut presentation = self.build(script)?;
        write_deck(&presentation, &self.style, output)?;
        presentation.file_path = Some(output.to_path_buf());
        log::info!(
            "Presentation saved: {} ({} slides)",
            output.display(),
            presentation.slide_count()
        );
        Ok(presentation)
    }

    /// Read an existing deck.
    pub fn load(path: &Path) -> Result<Presentation, RenderError> {
        read_deck(path)
    }

    /// Render every slide to `dir/slide_{index:03}.png` and record the image
    /// paths on the slides.
    pub fn export_images(
        &self,
        presentation: &mut Presentation,
        dir: &Path,
    ) -> Result<Vec<PathBuf>, RenderError> {
        let renderer = SlideRenderer::new(&self.style)?;
        std::fs::create_dir_all(dir)?;

        let has_title = presentation.has_title_slide;
        let mut paths = Vec::with_capacity(presentation.slides.len());
        for (i, slide) in presentation.slides.iter_mut().enumerate() {
            let path = dir.join(format!("slide_{:03}.png", slide.index));
            renderer.render_to_file(slide, has_title && i == 0, &path)?;
            slide.image_path = Some(path.clone());
            paths.push(path);
        }

        log::info!("Exported {} slide images to {}", paths.len(), dir.display());
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(id: u32, narration: &str, bullets: &[&str]) -> Scene {
        Scene {
            id,
            title: format!("섹션 {}", id),
            narration: narration.to_string(),
            bullets: bullets.iter().map(|b| b.to_string()).collect(),
            slide_notes: String::new(),
            estimated_duration_sec: 10.0,
        }
    }

    fn script(n: u32) -> Script {
        Script {
            title: "시간 관리의 중요성".into(),
            description: "설명".into(),
            scenes: (1..=n).map(|i| scene(i, "내용입니다.", &["포인트"])).collect(),
            tags: vec![],
            total_duration_sec: 0.0,
        }
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#4a90d9").unwrap(), [0x4a, 0x90, 0xd9]);
        assert_eq!(parse_hex_color("FFFFFF").unwrap(), [255, 255, 255]);
        assert!(parse_hex_color("#fff").is_err());
        assert!(parse_hex_color("#gggggg").is_err());
        assert!(parse_hex_color("#가나").is_err());
    }

    #[test]
    fn test_one_slide_per_scene() {
        let generator = PresentationGenerator::new(PresentationSettings::default());
        let deck = generator.build(&script(3)).unwrap();
        assert_eq!(deck.slide_count(), 3);
        assert!(!deck.has_title_slide);
        for (i, slide) in deck.slides.iter().enumerate() {
            assert_eq!(slide.index, i);
            assert_eq!(slide.title, format!("섹션 {}", i + 1));
            assert_eq!(slide.notes, "내용입니다.");
        }
    }

    #[test]
    fn test_title_slide_prepended() {
        let style = PresentationSettings {
            title_slide: true,
            ..PresentationSettings::default()
        };
        let deck = PresentationGenerator::new(style).build(&script(2)).unwrap();
        assert_eq!(deck.slide_count(), 3);
        assert!(deck.has_title_slide);
        assert_eq!(deck.slides[0].title, "시간 관리의 중요성");
        assert_eq!(deck.slides[0].bullets, vec!["설명"]);
        assert_eq!(deck.slides[2].index, 2);
    }

    #[test]
    fn test_empty_script_rejected() {
        let generator = PresentationGenerator::new(PresentationSettings::default());
        assert!(matches!(generator.build(&script(0)), Err(RenderError::EmptyScript)));
    }

    #[test]
    fn test_derive_bullets_from_narration() {
        let long = "가".repeat(80);
        let narration = format!("첫 문장입니다. 두 번째! 세 번째? {}. 다섯. 여섯. 일곱.", long);
        let bullets = derive_bullets(&scene(1, &narration, &[]));
        assert_eq!(bullets.len(), MAX_DERIVED_BULLETS);
        assert_eq!(bullets[0], "첫 문장입니다");
        assert_eq!(bullets[3].chars().count(), MAX_BULLET_CHARS + 1);
        assert!(bullets[3].ends_with('…'));
    }

    #[test]
    fn test_key_points_win() {
        let bullets = derive_bullets(&scene(1, "무시됨.", &["a", "b"]));
        assert_eq!(bullets, vec!["a", "b"]);
    }

    #[test]
    fn test_generate_writes_deck() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("presentations/deck.pptx");
        let generator = PresentationGenerator::new(PresentationSettings::default());
        let deck = generator.generate(&script(3), &out).unwrap();
        assert!(out.exists());
        assert_eq!(deck.file_path.as_deref(), Some(out.as_path()));

        let loaded = PresentationGenerator::load(&out).unwrap();
        assert_eq!(loaded.slide_count(), 3);
        assert_eq!(loaded.slides[0].bullets, vec!["포인트"]);
    }
}
