//! Audio probe: decode one file into a fixed-resolution peak envelope.

pub mod colors;
pub mod decode;
pub mod tempo;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Unsupported format: {0}")]
    Unsupported(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Precomputed waveform for display. `peaks` and `colors` always have the same length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaveformData {
    pub peaks: Vec<f32>,
    pub colors: Vec<[f32; 3]>,
    pub duration_secs: f64,
}

/// Decode `path` fully and reduce it to `resolution` peaks plus spectral colours.
pub fn probe(path: &Path, resolution: usize) -> Result<WaveformData, ProbeError> {
    let audio = decode::decode_mono(path, None)?;
    let peaks = peaks_from_mono(&audio.samples, resolution);
    let colors = colors::frequency_colors(&audio.samples, resolution, audio.sample_rate);
    Ok(WaveformData {
        peaks,
        colors,
        duration_secs: audio.duration_secs(),
    })
}

/// Max absolute amplitude per window, normalised to the loudest window.
///
/// Windows are proportional slices of the signal, so the result has exactly
/// `resolution` entries even when there are fewer samples than windows.
pub fn peaks_from_mono(samples: &[f32], resolution: usize) -> Vec<f32> {
    let len = samples.len();
    let mut peaks: Vec<f32> = (0..resolution)
        .map(|i| {
            let (start, end) = colors::window_bounds(i, resolution, len);
            samples[start..end]
                .iter()
                .fold(0.0f32, |acc, s| acc.max(s.abs()))
        })
        .collect();

    let max = peaks.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        for p in &mut peaks {
            *p = (*p / max).clamp(0.0, 1.0);
        }
    }
    peaks
}
