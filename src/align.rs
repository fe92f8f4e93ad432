//! Lining up a mix with its isolated target before both are transformed.
//!
//! This is a heuristic: leading and trailing silence is dropped from each waveform, the lag
//! between their heads is estimated by cross-correlation, and both are cut to a common span. It
//! gets the tracks to overlap, not to be phase locked.

use log::debug;
use ndarray::{Array2, Axis, s};
use realfft::RealFftPlanner;
use realfft::num_complex::Complex64;

use crate::config::{ALIGN_WINDOW_SECONDS, TRIM_FRAME_LENGTH, TRIM_HOP_LENGTH, TRIM_TOP_DB};
use crate::error::{BakeError, Result};

/// Drops leading and trailing near-silence. A frame is silent when its RMS, measured on the
/// channel mean over centered frames, is more than `top_db` below the loudest frame. Power is
/// floored at 1e-10, so a signal that is silent throughout has every frame at 0 dB and is kept
/// whole.
pub fn trim_silence(wave: &Array2<f32>, top_db: f32, frame_length: usize, hop_length: usize) -> Array2<f32> {
    let len = wave.ncols();
    if len == 0 {
        return wave.clone();
    }
    let mono = wave.mean_axis(Axis(0)).unwrap_or_else(|| wave.row(0).to_owned());

    let half = frame_length / 2;
    let frames = 1 + len / hop_length;
    let power: Vec<f32> = (0..frames)
        .map(|t| {
            let center = t * hop_length;
            let lo = center.saturating_sub(half);
            let hi = (center + half).min(len);
            let energy: f32 = mono.slice(s![lo..hi]).iter().map(|x| x * x).sum();
            energy / frame_length as f32
        })
        .collect();

    let reference = power.iter().cloned().fold(0.0f32, f32::max).max(1e-10);
    let threshold = -top_db;
    let loud: Vec<usize> = power
        .iter()
        .enumerate()
        .filter(|&(_, &p)| 10.0 * (p.max(1e-10) / reference).log10() > threshold)
        .map(|(t, _)| t)
        .collect();

    match (loud.first(), loud.last()) {
        (Some(&first), Some(&last)) => {
            let start = first * hop_length;
            let end = ((last + 1) * hop_length).min(len);
            wave.slice(s![.., start..end]).to_owned()
        }
        _ => Array2::zeros((wave.nrows(), 0)),
    }
}

/// Lag `k` maximizing `sum_n a[n + k] * b[n]`, searched over `[-(len_b - 1), len_a - 1]`.
/// A positive lag means `a` carries `k` extra leading samples. The first maximum wins.
pub fn estimate_lag(a: &[f32], b: &[f32]) -> Result<isize> {
    if a.is_empty() || b.is_empty() {
        return Ok(0);
    }

    let n = (a.len() + b.len() - 1).next_power_of_two();
    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let spectrum = |signal: &[f32]| -> Result<Vec<Complex64>> {
        let mut input = forward.make_input_vec();
        for (dst, &x) in input.iter_mut().zip(signal) {
            *dst = x as f64;
        }
        let mut output = forward.make_output_vec();
        forward
            .process(&mut input, &mut output)
            .map_err(|e| BakeError::Transform(e.to_string()))?;
        Ok(output)
    };

    let spec_a = spectrum(a)?;
    let spec_b = spectrum(b)?;
    let mut cross: Vec<Complex64> = spec_a.iter().zip(&spec_b).map(|(x, y)| x * y.conj()).collect();
    let last = cross.len() - 1;
    cross[0].im = 0.0;
    cross[last].im = 0.0;

    let mut correlation = inverse.make_output_vec();
    inverse
        .process(&mut cross, &mut correlation)
        .map_err(|e| BakeError::Transform(e.to_string()))?;

    // Circular layout: non-negative lags from the front, negative lags wrapped to the back.
    let min_lag = -(b.len() as isize - 1);
    let max_lag = a.len() as isize - 1;
    let mut best = (min_lag, f64::NEG_INFINITY);
    for lag in min_lag..=max_lag {
        let idx = if lag < 0 { (n as isize + lag) as usize } else { lag as usize };
        if correlation[idx] > best.1 {
            best = (lag, correlation[idx]);
        }
    }
    Ok(best.0)
}

/// Trims both waveforms, removes the estimated lag from whichever one starts early, and cuts both
/// to the shorter remaining length. The outputs always have the same number of samples.
pub fn align_waveforms(a: &Array2<f32>, b: &Array2<f32>, sample_rate: u32) -> Result<(Array2<f32>, Array2<f32>)> {
    let a = trim_silence(a, TRIM_TOP_DB, TRIM_FRAME_LENGTH, TRIM_HOP_LENGTH);
    let b = trim_silence(b, TRIM_TOP_DB, TRIM_FRAME_LENGTH, TRIM_HOP_LENGTH);

    let window = sample_rate as usize * ALIGN_WINDOW_SECONDS;
    let lag = estimate_lag(&head_mono(&a, window), &head_mono(&b, window))?;
    debug!("aligning with a lag of {} samples", lag);

    let (a, b) = if lag > 0 {
        let skip = (lag as usize).min(a.ncols());
        (a.slice(s![.., skip..]).to_owned(), b)
    } else {
        let skip = (lag.unsigned_abs()).min(b.ncols());
        (a, b.slice(s![.., skip..]).to_owned())
    };

    let len = a.ncols().min(b.ncols());
    Ok((a.slice(s![.., ..len]).to_owned(), b.slice(s![.., ..len]).to_owned()))
}

/// Channel sum of the first `window` samples, with its mean removed.
fn head_mono(wave: &Array2<f32>, window: usize) -> Vec<f32> {
    let head = wave.slice(s![.., ..window.min(wave.ncols())]);
    let mono = head.sum_axis(Axis(0));
    let mean = mono.mean().unwrap_or(0.0);
    mono.iter().map(|x| x - mean).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(len: usize, seed: u32) -> Vec<f32> {
        // Small LCG, good enough for a correlation peak.
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 8) as f32 / (1u32 << 24) as f32 - 0.5
            })
            .collect()
    }

    fn stereo(signal: &[f32]) -> Array2<f32> {
        Array2::from_shape_fn((2, signal.len()), |(_, i)| signal[i])
    }

    #[test]
    fn lag_of_a_delayed_copy() {
        let base = noise(4000, 7);
        let mut delayed = vec![0.0; 37];
        delayed.extend_from_slice(&base);

        assert_eq!(estimate_lag(&delayed, &base).unwrap(), 37);
        assert_eq!(estimate_lag(&base, &delayed).unwrap(), -37);
    }

    #[test]
    fn silence_is_trimmed_from_both_ends() {
        let mut signal = vec![0.0; 4096];
        signal.extend(noise(8192, 3));
        signal.extend(vec![0.0; 4096]);

        let trimmed = trim_silence(&stereo(&signal), 60.0, 2048, 512);
        // Frames straddling the edges count as loud, so the cut lands within a frame of them.
        assert!(trimmed.ncols() >= 8192);
        assert!(trimmed.ncols() <= 8192 + 2 * 2048);
    }

    #[test]
    fn all_silent_input_is_kept_whole() {
        let trimmed = trim_silence(&Array2::zeros((2, 10000)), 60.0, 2048, 512);
        assert_eq!(trimmed.ncols(), 10000);
    }

    #[test]
    fn alignment_is_symmetric() {
        let base = noise(20000, 11);
        let a = stereo(&base[300..]);
        let b = stereo(&base[..19000]);

        let (a1, b1) = align_waveforms(&a, &b, 1000).unwrap();
        let (b2, a2) = align_waveforms(&b, &a, 1000).unwrap();
        assert_eq!(a1.ncols(), b1.ncols());
        assert_eq!(a2.ncols(), b2.ncols());
        assert_eq!(a1.ncols(), a2.ncols());
        assert_eq!(a1, a2);
        assert_eq!(b1, b2);
    }

    #[test]
    fn aligned_outputs_overlap_sample_for_sample() {
        let base = noise(12000, 5);
        let mut late = vec![0.0; 500];
        late.extend_from_slice(&base[..10000]);
        // A quiet floor keeps the leading pad from being trimmed away.
        let late: Vec<f32> = late.iter().enumerate().map(|(i, x)| if i < 500 { 1e-2 } else { *x }).collect();

        let (a, b) = align_waveforms(&stereo(&late), &stereo(&base), 1000).unwrap();
        assert_eq!(a.ncols(), b.ncols());
        assert_eq!(a.slice(s![.., ..100]), b.slice(s![.., ..100]));
    }
}
