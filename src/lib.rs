pub mod config;
pub mod conflicts;
pub mod db;
pub mod export;
pub mod import;
pub mod library;
pub mod probe;
pub mod query;
pub mod scanner;
pub mod waveform;

/// Audio file extensions recognised by the scanner and the import pipeline.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "aiff", "aif"];

/// Number of peaks in every waveform, independent of source length.
pub const WAVEFORM_RESOLUTION: usize = 128;

/// Application name for XDG paths
pub const APP_NAME: &str = "sampleshelf";

/// True when the path has one of the [`SUPPORTED_EXTENSIONS`] (case-insensitive).
pub fn is_audio_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    /// Write a mono 16-bit sine WAV of the given length.
    pub fn write_sine_wav(path: &Path, secs: f32, freq: f32, sample_rate: u32) {
        write_wav(path, secs, sample_rate, 1, |t| (t * freq * 2.0 * std::f32::consts::PI).sin() * 0.5);
    }

    /// Write a WAV whose samples come from `f(t)` (t in seconds), duplicated across channels.
    pub fn write_wav(path: &Path, secs: f32, sample_rate: u32, channels: u16, f: impl Fn(f32) -> f32) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let frames = (secs * sample_rate as f32) as usize;
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let v = (f(t).clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn audio_extension_is_case_insensitive() {
        assert!(is_audio_file(Path::new("/a/Kick.WAV")));
        assert!(is_audio_file(Path::new("loop.aif")));
        assert!(!is_audio_file(Path::new("cover.png")));
        assert!(!is_audio_file(Path::new("README")));
    }
}
