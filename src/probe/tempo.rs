//! Tempo estimation and decay-tail detection on decoded mono audio.

/// Shortest signal (seconds) worth running tempo detection on.
pub const MIN_TEMPO_SECS: f64 = 2.0;

/// How much audio the import pipeline decodes for analysis.
pub const ANALYSIS_SECS: f64 = 30.0;

const MIN_BPM: u32 = 60;
const MAX_BPM: u32 = 190;
const SEARCH_MIN_BPM: f64 = 50.0;
const MIN_CORRELATION: f64 = 0.0005;

/// Estimate BPM from an onset-strength autocorrelation.
///
/// Energy is measured in 20 ms windows with a 10 ms hop, log-compressed and
/// half-wave differenced into an onset envelope. Lags between 50 and 190 BPM
/// are autocorrelated; the five strongest peaks and their octave variants are
/// scored with a preference for 80-160 BPM.
pub fn detect_bpm(samples: &[f32], sample_rate: u32) -> Option<u32> {
    let sr = sample_rate as f64;
    if sr <= 0.0 || (samples.len() as f64) < sr * MIN_TEMPO_SECS {
        return None;
    }

    let window = (sr * 0.02) as usize;
    let hop = (sr * 0.01) as usize;
    if window == 0 || hop == 0 {
        return None;
    }

    let energy: Vec<f64> = samples
        .windows(window)
        .step_by(hop)
        .map(|w| w.iter().map(|s| (*s as f64).powi(2)).sum::<f64>() / window as f64)
        .collect();
    if energy.len() < 20 {
        return None;
    }

    let log_energy: Vec<f64> = energy.iter().map(|e| (e + 1e-10).ln()).collect();
    let mut onset: Vec<f64> = std::iter::once(0.0)
        .chain(log_energy.windows(2).map(|w| (w[1] - w[0]).max(0.0)))
        .collect();
    let onset_max = onset.iter().cloned().fold(0.0f64, f64::max);
    if onset_max <= 0.0 {
        return None;
    }
    onset.iter_mut().for_each(|v| *v /= onset_max);

    let frames_per_sec = sr / hop as f64;
    let min_lag = (frames_per_sec * 60.0 / MAX_BPM as f64) as usize;
    let max_lag = ((frames_per_sec * 60.0 / SEARCH_MIN_BPM) as usize).min(onset.len() / 2);
    if min_lag == 0 || min_lag >= max_lag || max_lag >= onset.len() {
        return None;
    }

    let mut corr = vec![0.0f64; max_lag + 1];
    for lag in min_lag..=max_lag {
        let n = onset.len() - lag;
        let sum: f64 = onset[..n].iter().zip(&onset[lag..]).map(|(a, b)| a * b).sum();
        corr[lag] = sum / n as f64;
    }

    let mut peaks: Vec<(usize, f64)> = ((min_lag + 1)..max_lag)
        .filter(|&lag| {
            corr[lag] > corr[lag - 1] && corr[lag] > corr[lag + 1] && corr[lag] > MIN_CORRELATION
        })
        .map(|lag| (lag, corr[lag]))
        .collect();

    if peaks.is_empty() {
        let (lag, val) = (min_lag..=max_lag)
            .map(|lag| (lag, corr[lag]))
            .fold((min_lag, corr[min_lag]), |best, cur| if cur.1 > best.1 { cur } else { best });
        if val > MIN_CORRELATION {
            peaks.push((lag, val));
        }
    }
    peaks.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut best_score = 0.0f64;
    let mut best_bpm = 0u32;
    for &(lag, c) in peaks.iter().take(5) {
        let raw = 60.0 / (lag as f64 / frames_per_sec);
        for candidate_f in [raw, raw * 2.0, raw / 2.0] {
            let candidate = candidate_f.round() as u32;
            if !(MIN_BPM..=MAX_BPM).contains(&candidate) {
                continue;
            }
            let range_weight = if (80..=160).contains(&candidate) { 1.3 } else { 1.0 };
            let octave_penalty = if (candidate_f - raw).abs() < 1.0 { 1.0 } else { 0.8 };
            let score = c * range_weight * octave_penalty;
            if score > best_score {
                best_score = score;
                best_bpm = candidate;
            }
        }
    }

    // Slow picks are often the half-tempo subharmonic
    if best_bpm > 0 && best_bpm <= 95 {
        let double = best_bpm * 2;
        let double_lag = (frames_per_sec * 60.0 / double as f64) as usize;
        if double <= MAX_BPM
            && (min_lag..=max_lag).contains(&double_lag)
            && corr[double_lag] > best_score * 0.7
        {
            best_bpm = double;
        }
    }

    ((MIN_BPM..=MAX_BPM).contains(&best_bpm) && best_score > MIN_CORRELATION).then_some(best_bpm)
}

/// True when the signal decays into silence, the signature of a one-shot with a long tail.
///
/// RMS is taken over 100 ms chunks. The tail is the last 30%; it counts as
/// silent when more than 60% of its chunks sit below 3% of the peak, or when
/// the back half peaks below 10% of the front half.
pub fn has_trailing_silence(samples: &[f32], sample_rate: u32) -> bool {
    let chunk = sample_rate as usize / 10;
    if chunk == 0 {
        return false;
    }
    let total = samples.len() / chunk;
    if total < 5 {
        return false;
    }

    let energies: Vec<f64> = samples
        .chunks_exact(chunk)
        .map(|c| (c.iter().map(|s| (*s as f64).powi(2)).sum::<f64>() / c.len() as f64).sqrt())
        .collect();

    let peak = energies.iter().cloned().fold(0.0f64, f64::max);
    if peak <= 0.0 {
        return false;
    }

    let half = total / 2;
    let front = energies[..half].iter().cloned().fold(0.0f64, f64::max);
    let back = energies[half..].iter().cloned().fold(0.0f64, f64::max);
    if front <= 0.0 {
        return false;
    }

    let tail_start = (total as f64 * 0.7) as usize;
    let threshold = peak * 0.03;
    let silent = energies[tail_start..].iter().filter(|&&e| e < threshold).count();
    let ratio = silent as f64 / (total - tail_start) as f64;

    ratio > 0.6 || back < front * 0.1
}
