//! Slide/audio synchronisation.
//!
//! Each scene's slide stays on screen for its narration plus a fixed
//! padding, so slide `i` starts at `sum(d_0..d_{i-1}) + i * padding`.

use std::collections::HashMap;

use crate::config::VideoSettings;
use crate::models::{AudioSegment, Presentation, Script, TimingEntry, TimingManifest};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("No audio segment for scene {scene_id}; run the tts step first")]
    MissingAudio { scene_id: u32 },

    #[error("Script has {scenes} scenes but the presentation has only {slides} slides")]
    SlideCountMismatch { scenes: usize, slides: usize },

    #[error("Expected {expected} durations, got {actual}")]
    DurationCountMismatch { expected: usize, actual: usize },

    #[error("Invalid duration {duration} for scene {scene_id}")]
    InvalidDuration { scene_id: u32, duration: f64 },
}

/// Builds [`TimingManifest`]s.
#[derive(Debug, Clone, Copy)]
pub struct SyncService {
    /// Silence after each narration, in seconds.
    pub padding: f64,
    /// How long a title slide is shown.
    pub title_duration: f64,
}

impl Default for SyncService {
    fn default() -> Self {
        Self::from_settings(&VideoSettings::default())
    }
}

impl SyncService {
    pub fn new(padding: f64, title_duration: f64) -> Self {
        Self {
            padding: padding.max(0.0),
            title_duration: title_duration.max(0.0),
        }
    }

    pub fn from_settings(video: &VideoSettings) -> Self {
        Self::new(video.slide_padding, video.title_duration)
    }

    /// Match every scene with its slide and audio segment.
    ///
    /// When the presentation has exactly one slide more than the script has
    /// scenes, slide 0 is a title slide shown for `title_duration` without
    /// audio.
    pub fn build(
        &self,
        script: &Script,
        presentation: &Presentation,
        segments: &[AudioSegment],
    ) -> Result<TimingManifest, SyncError> {
        let scenes = script.scenes.len();
        let slides = presentation.slide_count();
        let title_offset = usize::from(presentation.has_title_slide || slides == scenes + 1);

        if slides < scenes + title_offset {
            return Err(SyncError::SlideCountMismatch { scenes, slides });
        }
        if slides > scenes + title_offset {
            log::warn!(
                "Presentation has {} slides for {} scenes; extra slides are not shown",
                slides,
                scenes
            );
        }

        let by_scene: HashMap<u32, &AudioSegment> =
            segments.iter().map(|s| (s.scene_id, s)).collect();

        let mut entries = Vec::with_capacity(scenes + title_offset);
        let mut current = 0.0;

        if title_offset == 1 {
            entries.push(TimingEntry {
                slide_index: 0,
                scene_id: 0,
                start_time: current,
                duration: self.title_duration,
                audio_file: None,
            });
            current += self.title_duration;
        }

        for (i, scene) in script.scenes.iter().enumerate() {
            let segment = by_scene
                .get(&scene.id)
                .ok_or(SyncError::MissingAudio { scene_id: scene.id })?;
            if !segment.duration.is_finite() || segment.duration < 0.0 {
                return Err(SyncError::InvalidDuration {
                    scene_id: scene.id,
                    duration: segment.duration,
                });
            }

            let duration = segment.duration + self.padding;
            entries.push(TimingEntry {
                slide_index: i + title_offset,
                scene_id: scene.id,
                start_time: current,
                duration,
                audio_file: Some(segment.path.clone()),
            });
            current += duration;
        }

        let manifest = TimingManifest::new(entries);
        log::info!(
            "Timing: {} slides, {:.1}s total",
            manifest.len(),
            manifest.total_duration
        );
        Ok(manifest)
    }

    /// Manifest for bare per-slide durations, without audio.
    pub fn from_durations(&self, durations: &[f64]) -> TimingManifest {
        let mut current = 0.0;
        let entries = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let duration = d.max(0.0) + self.padding;
                let entry = TimingEntry {
                    slide_index: i,
                    scene_id: i as u32 + 1,
                    start_time: current,
                    duration,
                    audio_file: None,
                };
                current += duration;
                entry
            })
            .collect();
        TimingManifest::new(entries)
    }

    /// Like [`from_durations`](Self::from_durations) but checks the count
    /// against the presentation.
    pub fn for_presentation(
        &self,
        presentation: &Presentation,
        durations: &[f64],
    ) -> Result<TimingManifest, SyncError> {
        if durations.len() != presentation.slide_count() {
            return Err(SyncError::DurationCountMismatch {
                expected: presentation.slide_count(),
                actual: durations.len(),
            });
        }
        Ok(self.from_durations(durations))
    }

    /// Replace narration durations (keyed by scene id) and re-flow start
    /// times. Entries without a new value keep their duration.
    pub fn adjust_timing(&self, manifest: &mut TimingManifest, actual: &HashMap<u32, f64>) {
        let mut current = 0.0;
        for entry in &mut manifest.entries {
            if let Some(d) = actual.get(&entry.scene_id) {
                entry.duration = d.max(0.0) + self.padding;
            }
            entry.start_time = current;
            current += entry.duration;
        }
        manifest.calculate_total_duration();
    }
}
