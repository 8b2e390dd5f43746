//! Encoding against a stand-in ffmpeg.
//!
//! The relative-path test changes the working directory, so it is the only
//! test here that touches relative paths.

#![cfg(unix)]

mod common;

use std::path::{Path, PathBuf};

use contents_autouploader::config::VideoSettings;
use contents_autouploader::models::{Presentation, Slide, TimingEntry, TimingManifest};
use contents_autouploader::video::{manifest_path, EncodingError, VideoGenerator};

fn deck(images: &[PathBuf]) -> Presentation {
    Presentation {
        title: "강의".into(),
        slides: images
            .iter()
            .enumerate()
            .map(|(index, image)| Slide {
                index,
                title: format!("슬라이드 {}", index + 1),
                bullets: vec![],
                notes: String::new(),
                image_path: Some(image.clone()),
            })
            .collect(),
        has_title_slide: false,
        file_path: None,
    }
}

fn timeline(slides: usize) -> TimingManifest {
    TimingManifest::new(
        (0..slides)
            .map(|i| TimingEntry {
                slide_index: i,
                scene_id: i as u32 + 1,
                start_time: i as f64 * 2.0,
                duration: 2.0,
                audio_file: None,
            })
            .collect(),
    )
}

fn write_images(dir: &Path, count: usize) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    (0..count)
        .map(|i| {
            let path = dir.join(format!("slide_{:03}.png", i));
            std::fs::write(&path, b"png").unwrap();
            path
        })
        .collect()
}

#[test]
fn test_relative_output_path_encodes() {
    let tmp = tempfile::tempdir().unwrap();
    let ffmpeg = common::stub_ffmpeg(tmp.path());
    let work = tmp.path().join("project");
    write_images(&work.join("slides"), 2);

    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(&work).unwrap();
    let images = vec![
        PathBuf::from("slides/slide_000.png"),
        PathBuf::from("slides/slide_001.png"),
    ];
    let output = Path::new("output/videos/lecture.mp4");
    let result = VideoGenerator::new(VideoSettings::default())
        .with_program(ffmpeg.to_string_lossy())
        .generate(&deck(&images), &timeline(2), output);
    std::env::set_current_dir(previous).unwrap();

    assert_eq!(result.unwrap(), output.to_path_buf());
    let video = work.join(output);
    assert_eq!(
        std::fs::read_to_string(&video).unwrap(),
        "segment slide_000.png\nsegment slide_001.png\n"
    );
    assert!(work.join(manifest_path(output)).exists());
    assert!(!work.join("output/videos/lecture_segments").exists());
}

#[test]
fn test_intermediate_segments_kept_on_request() {
    let tmp = tempfile::tempdir().unwrap();
    let ffmpeg = common::stub_ffmpeg(tmp.path());
    let images = write_images(&tmp.path().join("slides"), 3);
    let output = tmp.path().join("videos").join("lecture.mp4");

    VideoGenerator::new(VideoSettings::default())
        .with_program(ffmpeg.to_string_lossy())
        .keep_intermediate(true)
        .generate(&deck(&images), &timeline(3), &output)
        .unwrap();

    let segments = tmp.path().join("videos").join("lecture_segments");
    assert_eq!(
        std::fs::read_to_string(segments.join("concat.txt")).unwrap(),
        "file 'segment_000.mp4'\nfile 'segment_001.mp4'\nfile 'segment_002.mp4'\n"
    );
    assert_eq!(
        common::relative_files(&segments),
        [
            "concat.txt",
            "segment_000.mp4",
            "segment_001.mp4",
            "segment_002.mp4"
        ]
        .map(PathBuf::from)
    );

    let manifest = TimingManifest::load(&manifest_path(&output)).unwrap();
    assert_eq!(manifest.len(), 3);
    assert!((manifest.total_duration - 6.0).abs() < 1e-9);
}

#[test]
fn test_missing_slide_image_fails_before_encoding() {
    let tmp = tempfile::tempdir().unwrap();
    let ffmpeg = common::stub_ffmpeg(tmp.path());
    let images = write_images(&tmp.path().join("slides"), 2);
    std::fs::remove_file(&images[1]).unwrap();
    let output = tmp.path().join("videos").join("lecture.mp4");

    let err = VideoGenerator::new(VideoSettings::default())
        .with_program(ffmpeg.to_string_lossy())
        .generate(&deck(&images), &timeline(2), &output)
        .unwrap_err();
    assert!(matches!(err, EncodingError::MissingSlideImage { slide_index: 1 }));
    assert!(!output.exists());
}

#[test]
fn test_ffmpeg_not_installed() {
    let tmp = tempfile::tempdir().unwrap();
    let images = write_images(&tmp.path().join("slides"), 1);

    let err = VideoGenerator::new(VideoSettings::default())
        .with_program("definitely-not-ffmpeg-xyz")
        .generate(&deck(&images), &timeline(1), &tmp.path().join("out.mp4"))
        .unwrap_err();
    assert!(matches!(err, EncodingError::FfmpegNotFound));
}
