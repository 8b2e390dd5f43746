//! Slide image rendering.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use super::{parse_hex_color, RenderError};
use crate::config::PresentationSettings;
use crate::models::Slide;

/// Fonts tried when no `presentation.font_path` is configured. CJK-capable
/// fonts come first so Korean text renders.
pub const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/nanum/NanumGothic.ttf",
    "/System/Library/Fonts/AppleSDGothicNeo.ttc",
    "/Library/Fonts/AppleGothic.ttf",
    "C:\\Windows\\Fonts\\malgun.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
];

/// Points to pixels at 96 DPI.
fn pt_to_px(pt: u32) -> f32 {
    pt as f32 * 96.0 / 72.0
}

/// Locate and load the slide font.
pub fn load_font(font_path: Option<&Path>) -> Result<FontVec, RenderError> {
    let path = match font_path {
        Some(p) => {
            if !p.exists() {
                return Err(RenderError::FontNotFound {
                    searched: vec![p.to_path_buf()],
                });
            }
            p.to_path_buf()
        }
        None => SYSTEM_FONT_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or_else(|| RenderError::FontNotFound {
                searched: SYSTEM_FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
            })?,
    };

    log::debug!("Loading font {}", path.display());
    let data = std::fs::read(&path)?;
    // index 0 also covers the first face of a .ttc collection
    FontVec::try_from_vec_and_index(data, 0).map_err(|e| RenderError::InvalidFont {
        path,
        message: e.to_string(),
    })
}

/// Greedy line wrapping. `measure` returns the rendered width of a string.
///
/// Words longer than `max_width` are broken between characters, which is
/// also how unspaced Korean runs end up wrapped.
pub fn wrap_text(text: &str, max_width: u32, measure: impl Fn(&str) -> u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };

        if measure(&candidate) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        if measure(word) <= max_width {
            current = word.to_string();
        } else {
            for c in word.chars() {
                let mut next = current.clone();
                next.push(c);
                if measure(&next) > max_width && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                } else {
                    current = next;
                }
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Draws slides onto PNG canvases.
pub struct SlideRenderer {
    font: FontVec,
    width: u32,
    height: u32,
    background: Rgb<u8>,
    title_color: Rgb<u8>,
    body_color: Rgb<u8>,
    accent_color: Rgb<u8>,
    title_scale: PxScale,
    body_scale: PxScale,
}

impl SlideRenderer {
    pub fn new(style: &PresentationSettings) -> Result<Self, RenderError> {
        let font = load_font(style.font_path.as_deref())?;
        Self::with_font(font, style)
    }

    pub fn with_font(font: FontVec, style: &PresentationSettings) -> Result<Self, RenderError> {
        Ok(Self {
            font,
            width: style.width,
            height: style.height,
            background: Rgb(parse_hex_color(&style.background_color)?),
            title_color: Rgb(parse_hex_color(&style.title_color)?),
            body_color: Rgb(parse_hex_color(&style.body_color)?),
            accent_color: Rgb(parse_hex_color(&style.accent_color)?),
            title_scale: PxScale::from(pt_to_px(style.title_font_size)),
            body_scale: PxScale::from(pt_to_px(style.body_font_size)),
        })
    }

    fn measure(&self, scale: PxScale, text: &str) -> u32 {
        text_size(scale, &self.font, text).0
    }

    fn draw_lines(
        &self,
        img: &mut RgbImage,
        lines: &[String],
        scale: PxScale,
        color: Rgb<u8>,
        y: i32,
        centered: bool,
    ) -> i32 {
        let line_height = (scale.y * 1.35) as i32;
        let mut y = y;
        for line in lines {
            let x = if centered {
                (self.width as i32 - self.measure(scale, line) as i32) / 2
            } else {
                (self.width as f32 * 0.05) as i32
            };
            draw_text_mut(img, color, x.max(0), y, scale, &self.font, line);
            y += line_height;
        }
        y
    }

    /// Render one slide. `is_title` selects the centered title layout.
    pub fn render(&self, slide: &Slide, is_title: bool) -> RgbImage {
        let w = self.width as f32;
        let h = self.height as f32;
        let mut img = RgbImage::from_pixel(self.width, self.height, self.background);
        let bar_h = (h * 0.006).max(4.0) as u32;

        if is_title {
            let big = PxScale::from(self.title_scale.y + pt_to_px(10));
            let lines = wrap_text(&slide.title, (w * 0.9) as u32, |t| self.measure(big, t));
            let block = lines.len() as f32 * big.y * 1.35;
            let y = self.draw_lines(&mut img, &lines, big, self.title_color, (h * 0.45 - block) as i32, true);

            draw_filled_rect_mut(
                &mut img,
                Rect::at((w * 0.4) as i32, y + 10).of_size((w * 0.2) as u32, bar_h),
                self.accent_color,
            );

            if let Some(subtitle) = slide.bullets.first() {
                let lines = wrap_text(subtitle, (w * 0.8) as u32, |t| self.measure(self.body_scale, t));
                self.draw_lines(&mut img, &lines, self.body_scale, self.body_color, y + 40, true);
            }
            return img;
        }

        let max_width = (w * 0.9) as u32;
        let title_lines = wrap_text(&slide.title, max_width, |t| self.measure(self.title_scale, t));
        let mut y = self.draw_lines(&mut img, &title_lines, self.title_scale, self.title_color, (h * 0.06) as i32, false);

        draw_filled_rect_mut(
            &mut img,
            Rect::at((w * 0.05) as i32, y + 8).of_size((w * 0.12) as u32, bar_h),
            self.accent_color,
        );
        y += 8 + bar_h as i32 + (self.body_scale.y * 1.2) as i32;

        for bullet in &slide.bullets {
            let text = format!("• {}", bullet);
            let lines = wrap_text(&text, max_width, |t| self.measure(self.body_scale, t));
            y = self.draw_lines(&mut img, &lines, self.body_scale, self.body_color, y, false);
            y += (self.body_scale.y * 0.4) as i32;
            if y as f32 > h * 0.95 {
                log::warn!("Slide '{}' overflows; remaining bullets are cut", slide.title);
                break;
            }
        }
        img
    }

    /// Render and save as PNG.
    pub fn render_to_file(&self, slide: &Slide, is_title: bool, path: &Path) -> Result<(), RenderError> {
        crate::util::ensure_parent(path)?;
        self.render(slide, is_title).save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> u32 {
        s.chars().count() as u32
    }

    #[test]
    fn test_wrap_by_words() {
        let lines = wrap_text("one two three four", 9, chars);
        assert_eq!(lines, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_wrap_breaks_long_words() {
        let lines = wrap_text("가나다라마바사", 3, chars);
        assert_eq!(lines, vec!["가나다", "라마바", "사"]);
    }

    #[test]
    fn test_wrap_empty() {
        assert!(wrap_text("   ", 10, chars).is_empty());
    }

    #[test]
    fn test_missing_configured_font() {
        let err = load_font(Some(Path::new("/nonexistent/font.ttf"))).unwrap_err();
        match err {
            RenderError::FontNotFound { searched } => {
                assert_eq!(searched, vec![PathBuf::from("/nonexistent/font.ttf")])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_render_dimensions_when_font_available() {
        // Only runs where a system font exists.
        let Ok(font) = load_font(None) else {
            return;
        };
        let style = PresentationSettings {
            width: 320,
            height: 180,
            ..PresentationSettings::default()
        };
        let renderer = SlideRenderer::with_font(font, &style).unwrap();
        let slide = Slide {
            index: 0,
            title: "제목".into(),
            bullets: vec!["하나".into(), "둘".into()],
            notes: String::new(),
            image_path: None,
        };
        let img = renderer.render(&slide, false);
        assert_eq!(img.dimensions(), (320, 180));
        assert_eq!(*img.get_pixel(319, 179), Rgb([255, 255, 255]));
    }
}
