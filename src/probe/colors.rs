//! Spectral colouring of waveform windows.
//!
//! Each window's energy is split into five frequency bands and blended into an
//! RGB triple: sub-bass leans red, low-mids yellow, mids green, high-mids cyan
//! and highs blue.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const MAX_FFT_SIZE: usize = 2048;
const MIN_FFT_SIZE: usize = 64;

/// Colour used for silent or empty windows.
pub const NEUTRAL: [f32; 3] = [0.4, 0.4, 0.6];

/// Upper edge (Hz) and colour of each band, lowest first. The last band runs to Nyquist.
const BANDS: [(f32, [f32; 3]); 5] = [
    (150.0, [0.95, 0.10, 0.10]),
    (600.0, [0.95, 0.75, 0.10]),
    (2500.0, [0.15, 0.90, 0.20]),
    (6000.0, [0.10, 0.70, 0.90]),
    (f32::INFINITY, [0.20, 0.30, 0.95]),
];

/// Brightest channel after normalisation.
const TARGET_BRIGHTNESS: f32 = 0.85;

/// Window `i` of `n` over `len` samples, as a half-open range.
pub(crate) fn window_bounds(i: usize, n: usize, len: usize) -> (usize, usize) {
    (i * len / n, (i + 1) * len / n)
}

/// One RGB triple per window, parallel to the peak series.
pub fn frequency_colors(samples: &[f32], windows: usize, sample_rate: u32) -> Vec<[f32; 3]> {
    if samples.is_empty() || windows == 0 || sample_rate == 0 {
        return vec![NEUTRAL; windows];
    }

    let window_len = (samples.len() / windows).max(1);
    let fft_size = window_len.next_power_of_two().clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);
    let nyquist = fft_size / 2;

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    let hann: Vec<f32> = (0..fft_size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos()))
        .collect();

    // Bin index where each band ends; every band gets at least one bin.
    let mut edges = [0usize; BANDS.len()];
    let mut prev = 1;
    for (slot, (hz, _)) in edges.iter_mut().zip(BANDS.iter()) {
        let bin = if hz.is_finite() {
            (hz * fft_size as f32 / sample_rate as f32).round() as usize
        } else {
            nyquist
        };
        *slot = bin.max(prev + 1).min(nyquist);
        prev = *slot;
    }

    let mut buffer = vec![Complex { re: 0.0f32, im: 0.0f32 }; fft_size];

    (0..windows)
        .map(|i| {
            let (start, end) = window_bounds(i, windows, samples.len());
            let chunk = &samples[start..end];

            buffer.iter_mut().for_each(|c| *c = Complex { re: 0.0, im: 0.0 });

            // Centre the FFT frame on the window
            let copy_len = chunk.len().min(fft_size);
            let src_offset = (chunk.len() - copy_len) / 2;
            let dst_offset = (fft_size - copy_len) / 2;
            for j in 0..copy_len {
                let k = dst_offset + j;
                buffer[k].re = chunk[src_offset + j] * hann[k];
            }

            fft.process(&mut buffer);

            let mut energy = [0.0f32; BANDS.len()];
            let mut band = 0;
            for (bin, c) in buffer.iter().enumerate().take(nyquist).skip(1) {
                while band + 1 < BANDS.len() && bin >= edges[band] {
                    band += 1;
                }
                energy[band] += c.norm_sqr();
            }

            // Energy density per bin so wide bands don't dominate
            let mut lower = 1;
            for (e, &upper) in energy.iter_mut().zip(edges.iter()) {
                *e /= upper.saturating_sub(lower).max(1) as f32;
                lower = upper;
            }

            blend(&energy)
        })
        .collect()
}

fn blend(density: &[f32; BANDS.len()]) -> [f32; 3] {
    let total: f32 = density.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return NEUTRAL;
    }

    let mut rgb = [0.0f32; 3];
    for (d, (_, color)) in density.iter().zip(BANDS.iter()) {
        let w = d / total;
        for (out, c) in rgb.iter_mut().zip(color.iter()) {
            *out += w * c;
        }
    }

    let max_c = rgb.iter().cloned().fold(0.001f32, f32::max);
    let scale = TARGET_BRIGHTNESS / max_c;
    rgb.map(|c| (c * scale).min(1.0))
}
