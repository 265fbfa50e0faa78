use super::ProbeError;
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// Mono PCM produced by channel-averaging a decoded stream.
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>, ProbeError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ProbeError::NotFound(path.to_path_buf()),
        _ => ProbeError::Io(e),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => ProbeError::Unsupported(what.to_string()),
            other => ProbeError::Decode(format!("probe failed: {other}")),
        })?;
    Ok(probed.format)
}

/// Decode a file to mono, stopping after `max_seconds` when given.
///
/// Corrupt packets are skipped; a stream that yields no audio at all is a decode error.
pub fn decode_mono(path: &Path, max_seconds: Option<f64>) -> Result<MonoAudio, ProbeError> {
    let mut format = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ProbeError::Unsupported("no decodable audio track".into()))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(FALLBACK_SAMPLE_RATE);
    let max_samples = max_seconds.map(|s| (s * sample_rate as f64) as usize);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ProbeError::Unsupported(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut decoded_any = false;

    loop {
        if max_samples.is_some_and(|max| samples.len() >= max) {
            break;
        }
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                if decoded_any {
                    log::debug!("Stopping decode of {} early: {}", path.display(), e);
                    break;
                }
                return Err(ProbeError::Decode(e.to_string()));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                decoded_any = true;
                let spec = *decoded.spec();
                let channels = spec.channels.count().max(1);
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend(
                    buf.samples()
                        .chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                );
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => {
                if decoded_any {
                    break;
                }
                return Err(ProbeError::Decode(e.to_string()));
            }
        }
    }

    if !decoded_any {
        return Err(ProbeError::Decode("stream contained no audio".into()));
    }
    if let Some(max) = max_samples {
        samples.truncate(max);
    }

    Ok(MonoAudio {
        samples,
        sample_rate,
    })
}

/// Duration from the container's frame count, without decoding.
pub fn container_duration_secs(path: &Path) -> Option<f64> {
    let format = open_format(path).ok()?;
    let track = format.default_track()?;
    let tb = track.codec_params.time_base?;
    let frames = track.codec_params.n_frames?;
    let time = tb.calc_time(frames);
    Some(time.seconds as f64 + time.frac)
}
