//! Video assembly.
//!
//! Each timing entry becomes one MP4 segment (a looped slide image plus its
//! narration), and the segments are joined with ffmpeg's concat demuxer.

pub mod ffmpeg;

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::VideoSettings;
use crate::interrupt::ctrlc_received;
use crate::models::{Presentation, TimingEntry, TimingManifest};

pub use ffmpeg::FfmpegProcess;

const AUDIO_SAMPLE_RATE: u32 = 44_100;
const AUDIO_BITRATE: &str = "192k";

#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("ffmpeg not found. Install it and make sure it is on PATH")]
    FfmpegNotFound,

    #[error("Failed to spawn ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("ffmpeg exited with code {}:\n{stderr}", display_code(.exit_code))]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Encoding interrupted")]
    Interrupted,

    #[error("Slide {slide_index} has no rendered image; run the ppt step first")]
    MissingSlideImage { slide_index: usize },

    #[error("Timing manifest is empty")]
    EmptyTimeline,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn secs(value: f64) -> String {
    format!("{:.3}", value.max(0.0))
}

/// Fade length for an entry: the configured length, at most half the entry.
pub fn fade_duration(transition: f64, entry_duration: f64) -> f64 {
    transition.max(0.0).min(entry_duration / 2.0)
}

/// `-filter_complex` graph for one segment.
fn segment_filter(settings: &VideoSettings, duration: f64, fade: f64) -> String {
    let (w, h) = (settings.width, settings.height);
    let mut video = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,format=yuv420p"
    );
    if fade > 0.0 {
        let _ = write!(
            video,
            ",fade=t=in:st=0:d={},fade=t=out:st={}:d={}",
            secs(fade),
            secs(duration - fade),
            secs(fade)
        );
    }
    format!("{video}[v];[1:a]apad[a]")
}

/// ffmpeg arguments that encode one timing entry into `output`.
///
/// Entries without audio get a silent track so every segment has the same
/// stream layout, which the concat demuxer needs for stream copy.
pub fn segment_args(
    settings: &VideoSettings,
    image: &Path,
    audio: Option<&Path>,
    duration: f64,
    fade: f64,
    output: &Path,
) -> Vec<String> {
    let fps = settings.fps.to_string();
    let mut args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-loop".into(),
        "1".into(),
        "-framerate".into(),
        fps.clone(),
        "-i".into(),
        image.to_string_lossy().into_owned(),
    ];

    match audio {
        Some(path) => {
            args.push("-i".into());
            args.push(path.to_string_lossy().into_owned());
        }
        None => {
            args.extend([
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                format!("anullsrc=channel_layout=stereo:sample_rate={AUDIO_SAMPLE_RATE}"),
            ]);
        }
    }

    args.extend([
        "-filter_complex".into(),
        segment_filter(settings, duration, fade),
        "-map".into(),
        "[v]".into(),
        "-map".into(),
        "[a]".into(),
        "-t".into(),
        secs(duration),
        "-r".into(),
        fps,
        "-c:v".into(),
        settings.codec.clone(),
        "-b:v".into(),
        settings.bitrate.clone(),
    ]);

    if settings.codec.contains("264") {
        args.extend([
            "-preset".into(),
            "medium".into(),
            "-tune".into(),
            "stillimage".into(),
        ]);
    }

    args.extend([
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-c:a".into(),
        settings.audio_codec.clone(),
        "-b:a".into(),
        AUDIO_BITRATE.into(),
        "-ar".into(),
        AUDIO_SAMPLE_RATE.to_string(),
        "-ac".into(),
        "2".into(),
        output.to_string_lossy().into_owned(),
    ]);
    args
}

/// Contents of a concat demuxer list file.
///
/// ffmpeg resolves entries against the list's own directory, so the list
/// must sit next to the segments and name them by file name only.
pub fn concat_list(segments: &[PathBuf]) -> String {
    let mut list = String::new();
    for path in segments {
        let name = path.file_name().unwrap_or(path.as_os_str());
        let escaped = name.to_string_lossy().replace('\'', r"'\''");
        let _ = writeln!(list, "file '{}'", escaped);
    }
    list
}

/// ffmpeg arguments that join the segments listed in `list_file`.
pub fn concat_args(list_file: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_file.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Path of the timing manifest written next to `video`.
pub fn manifest_path(video: &Path) -> PathBuf {
    video.with_extension("timing.json")
}

/// Builds the final MP4 from slide images and narration.
pub struct VideoGenerator {
    settings: VideoSettings,
    transitions: bool,
    keep_intermediate: bool,
    program: String,
}

impl VideoGenerator {
    pub fn new(settings: VideoSettings) -> Self {
        Self {
            settings,
            transitions: true,
            keep_intermediate: false,
            program: "ffmpeg".to_string(),
        }
    }

    pub fn with_transitions(mut self, enabled: bool) -> Self {
        self.transitions = enabled;
        self
    }

    pub fn keep_intermediate(mut self, keep: bool) -> Self {
        self.keep_intermediate = keep;
        self
    }

    /// Use a different ffmpeg binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    fn image_for<'a>(
        presentation: &'a Presentation,
        entry: &TimingEntry,
    ) -> Result<&'a Path, EncodingError> {
        presentation
            .slides
            .get(entry.slide_index)
            .and_then(|s| s.image_path.as_deref())
            .filter(|p| p.exists())
            .ok_or(EncodingError::MissingSlideImage {
                slide_index: entry.slide_index,
            })
    }

    /// Encode `presentation` according to `manifest` into `output`.
    ///
    /// The manifest is saved to [`manifest_path`]`(output)`.
    pub fn generate(
        &self,
        presentation: &Presentation,
        manifest: &TimingManifest,
        output: &Path,
    ) -> Result<PathBuf, EncodingError> {
        if manifest.is_empty() {
            return Err(EncodingError::EmptyTimeline);
        }

        let images = manifest
            .entries
            .iter()
            .map(|entry| Self::image_for(presentation, entry))
            .collect::<Result<Vec<_>, _>>()?;

        ffmpeg::check_available(&self.program)?;

        crate::util::ensure_parent(output)?;
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let work_dir = output.with_file_name(format!("{stem}_segments"));
        crate::util::ensure_dir(&work_dir)?;

        log::info!(
            "Encoding {} segments ({:.1}s) into {}",
            manifest.len(),
            manifest.total_duration,
            output.display()
        );

        let result = self.encode(manifest, &images, &work_dir, output);

        if !self.keep_intermediate {
            if let Err(e) = std::fs::remove_dir_all(&work_dir) {
                log::warn!("Failed to remove {}: {}", work_dir.display(), e);
            }
        }
        result?;

        let manifest_file = manifest_path(output);
        let json = serde_json::to_string_pretty(manifest).map_err(std::io::Error::from)?;
        std::fs::write(&manifest_file, json)?;

        log::info!("Video written to {}", output.display());
        Ok(output.to_path_buf())
    }

    fn encode(
        &self,
        manifest: &TimingManifest,
        images: &[&Path],
        work_dir: &Path,
        output: &Path,
    ) -> Result<(), EncodingError> {
        let mut segments = Vec::with_capacity(manifest.len());

        for (i, (entry, image)) in manifest.entries.iter().zip(images).enumerate() {
            if ctrlc_received() {
                return Err(EncodingError::Interrupted);
            }

            let segment = work_dir.join(format!("segment_{:03}.mp4", i));
            let fade = if self.transitions {
                fade_duration(self.settings.transition_duration, entry.duration)
            } else {
                0.0
            };
            let audio = entry.audio_file.as_deref().filter(|p| {
                let exists = p.exists();
                if !exists {
                    log::warn!("Audio {} missing, using silence", p.display());
                }
                exists
            });

            log::info!(
                "Segment {}/{}: slide {} ({:.1}s)",
                i + 1,
                manifest.len(),
                entry.slide_index,
                entry.duration
            );
            let args = segment_args(&self.settings, image, audio, entry.duration, fade, &segment);
            ffmpeg::run(&self.program, &args)?;
            segments.push(segment);
        }

        let list_file = work_dir.join("concat.txt");
        std::fs::write(&list_file, concat_list(&segments))?;
        ffmpeg::run(&self.program, &concat_args(&list_file, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Slide;

    fn entry(slide_index: usize, duration: f64) -> TimingEntry {
        TimingEntry {
            slide_index,
            scene_id: slide_index as u32 + 1,
            start_time: 0.0,
            duration,
            audio_file: None,
        }
    }

    #[test]
    fn test_fade_clamped_to_half() {
        assert_eq!(fade_duration(0.5, 10.0), 0.5);
        assert_eq!(fade_duration(0.5, 0.6), 0.3);
        assert_eq!(fade_duration(-1.0, 10.0), 0.0);
    }

    #[test]
    fn test_segment_args_with_audio() {
        let settings = VideoSettings::default();
        let args = segment_args(
            &settings,
            Path::new("slide_000.png"),
            Some(Path::new("section_001.mp3")),
            12.5,
            0.5,
            Path::new("segment_000.mp4"),
        );

        let joined = args.join(" ");
        assert!(joined.contains("-loop 1 -framerate 30 -i slide_000.png -i section_001.mp3"));
        assert!(joined.contains("-t 12.500"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-tune stillimage"));
        assert!(joined.contains("fade=t=out:st=12.000:d=0.500"));
        assert!(joined.contains("[1:a]apad[a]"));
        assert!(!joined.contains("anullsrc"));
        assert_eq!(args.last().map(String::as_str), Some("segment_000.mp4"));
    }

    #[test]
    fn test_segment_args_silent_without_fade() {
        let settings = VideoSettings::default();
        let args = segment_args(
            &settings,
            Path::new("title.png"),
            None,
            3.0,
            0.0,
            Path::new("out.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-f lavfi -i anullsrc=channel_layout=stereo:sample_rate=44100"));
        assert!(!joined.contains("fade="));
        assert!(joined.contains("scale=1920:1080"));
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/tmp/a.mp4"), PathBuf::from("/tmp/it's.mp4")]);
        assert_eq!(list, "file 'a.mp4'\nfile 'it'\\''s.mp4'\n");
    }

    #[test]
    fn test_concat_list_names_relative_to_list_dir() {
        let list = concat_list(&[
            PathBuf::from("output/videos/lecture_segments/segment_000.mp4"),
            PathBuf::from("output/videos/lecture_segments/segment_001.mp4"),
        ]);
        assert_eq!(list, "file 'segment_000.mp4'\nfile 'segment_001.mp4'\n");
    }

    #[test]
    fn test_concat_args() {
        let args = concat_args(Path::new("list.txt"), Path::new("final.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-f concat -safe 0 -i list.txt -c copy -movflags +faststart final.mp4"));
    }

    #[test]
    fn test_manifest_path() {
        assert_eq!(
            manifest_path(Path::new("output/videos/talk.mp4")),
            PathBuf::from("output/videos/talk.timing.json")
        );
    }

    #[test]
    fn test_missing_image_fails_before_ffmpeg() {
        let presentation = Presentation {
            title: "t".into(),
            slides: vec![Slide {
                index: 0,
                title: "s".into(),
                bullets: vec![],
                notes: String::new(),
                image_path: None,
            }],
            has_title_slide: false,
            file_path: None,
        };
        let manifest = TimingManifest::new(vec![entry(0, 2.0)]);
        let generator = VideoGenerator::new(VideoSettings::default()).with_program("no-ffmpeg-here");

        let err = generator
            .generate(&presentation, &manifest, Path::new("/tmp/never.mp4"))
            .unwrap_err();
        assert!(matches!(err, EncodingError::MissingSlideImage { slide_index: 0 }));
    }

    #[test]
    fn test_empty_manifest() {
        let presentation = Presentation {
            title: "t".into(),
            slides: vec![],
            has_title_slide: false,
            file_path: None,
        };
        let generator = VideoGenerator::new(VideoSettings::default());
        let err = generator
            .generate(&presentation, &TimingManifest::default(), Path::new("x.mp4"))
            .unwrap_err();
        assert!(matches!(err, EncodingError::EmptyTimeline));
    }
}
