//! Audio duration probing.

use std::path::Path;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::SynthesisError;

/// Bytes per second assumed when a file cannot be probed (16 kbps).
const FALLBACK_BYTES_PER_SEC: f64 = 2000.0;

/// Duration of an audio file in seconds.
///
/// WAV files are read with `hound`, everything else with `symphonia`. When
/// probing fails the duration is estimated from the file size and a warning
/// is logged.
pub fn probe_duration(path: &Path) -> Result<f64, SynthesisError> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

    let probed = if is_wav {
        wav_duration(path)
    } else {
        compressed_duration(path)
    };

    match probed {
        Ok(secs) => Ok(secs),
        Err(e) => {
            let size = std::fs::metadata(path)?.len();
            let estimate = size as f64 / FALLBACK_BYTES_PER_SEC;
            log::warn!(
                "Could not probe {} ({}); estimating {:.1}s from file size",
                path.display(),
                e,
                estimate
            );
            Ok(estimate)
        }
    }
}

/// Exact duration of a WAV file from its header.
pub fn wav_duration(path: &Path) -> Result<f64, SynthesisError> {
    let reader = hound::WavReader::open(path).map_err(|e| SynthesisError::Probe {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return Err(SynthesisError::Probe {
            path: path.to_path_buf(),
            message: "invalid WAV header".to_string(),
        });
    }
    // len() counts samples across all channels
    let frames = reader.len() as f64 / spec.channels as f64;
    Ok(frames / spec.sample_rate as f64)
}

/// Duration of an MP3 (or other symphonia-readable) file.
///
/// Uses the frame count from the stream header when present, otherwise sums
/// packet durations without decoding.
pub fn compressed_duration(path: &Path) -> Result<f64, SynthesisError> {
    let probe_err = |message: String| SynthesisError::Probe {
        path: path.to_path_buf(),
        message,
    };

    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| probe_err(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| probe_err("no audio track".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
        if rate > 0 && frames > 0 {
            return Ok(frames as f64 / rate as f64);
        }
    }

    let mut total: u64 = 0;
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() == track_id {
            total += packet.dur();
        }
    }

    match (params.time_base, params.sample_rate) {
        (Some(tb), _) => {
            let time = tb.calc_time(total);
            Ok(time.seconds as f64 + time.frac)
        }
        (None, Some(rate)) if rate > 0 => Ok(total as f64 / rate as f64),
        _ => Err(probe_err("stream has no time base".to_string())),
    }
}
