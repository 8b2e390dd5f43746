use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One synthesized narration clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    pub scene_id: u32,
    pub path: PathBuf,
    /// Seconds.
    pub duration: f64,
}

/// When one slide is on screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingEntry {
    pub slide_index: usize,
    /// `0` for the title slide.
    pub scene_id: u32,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub audio_file: Option<PathBuf>,
}

impl TimingEntry {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Ordered slide timings for the final video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingManifest {
    pub entries: Vec<TimingEntry>,
    pub total_duration: f64,
}

impl TimingManifest {
    pub fn new(entries: Vec<TimingEntry>) -> Self {
        let mut manifest = Self {
            entries,
            total_duration: 0.0,
        };
        manifest.calculate_total_duration();
        manifest
    }

    /// Total is the latest end time, `0.0` when empty.
    pub fn calculate_total_duration(&mut self) -> f64 {
        self.total_duration = self
            .entries
            .iter()
            .map(TimingEntry::end_time)
            .fold(0.0, f64::max);
        self.total_duration
    }

    pub fn entry_for_slide(&self, slide_index: usize) -> Option<&TimingEntry> {
        self.entries.iter().find(|e| e.slide_index == slide_index)
    }

    /// Slide on screen at `time` seconds, if any.
    pub fn slide_at(&self, time: f64) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.start_time <= time && time < e.end_time())
            .map(|e| e.slide_index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: &Path) -> Result<Self, crate::Error> {
        super::read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), crate::Error> {
        super::write_json(self, path)
    }
}
