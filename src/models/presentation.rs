use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single slide in the deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    /// Zero-based position in the deck.
    pub index: usize,
    pub title: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    /// Speaker notes (the narration).
    #[serde(default)]
    pub notes: String,
    /// Rendered PNG used as the video frame.
    #[serde(default)]
    pub image_path: Option<PathBuf>,
}

/// Complete presentation with all slides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presentation {
    pub title: String,
    pub slides: Vec<Slide>,
    /// Slide 0 is a title slide with no matching scene.
    #[serde(default)]
    pub has_title_slide: bool,
    /// Path to the `.pptx` deck, once written.
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

impl Presentation {
    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Slides that carry a scene's narration.
    pub fn content_slides(&self) -> &[Slide] {
        if self.has_title_slide && !self.slides.is_empty() {
            &self.slides[1..]
        } else {
            &self.slides
        }
    }
}
