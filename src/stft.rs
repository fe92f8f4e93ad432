//! Short-time Fourier transform and its inverse, one channel at a time.
//!
//! Frames are centered: the signal is reflect-padded by `n_fft / 2` on both sides, so a signal of
//! `len` samples yields `1 + len / hop_length` frames of `n_fft / 2 + 1` bins. The forward FFT is
//! unnormalized; the inverse divides by `n_fft` and undoes the Hann window with the usual
//! window-square overlap-add normalization.

use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use realfft::num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::Spectrogram;
use crate::error::{BakeError, Result};

pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    window: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_length: usize) -> Self {
        let mut planner = RealFftPlanner::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);

        // Periodic Hann window.
        let window = (0..n_fft)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n_fft as f32).cos()))
            .collect();

        Self {
            n_fft,
            hop_length,
            window,
            forward,
            inverse,
        }
    }

    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// Complex spectrogram `[bins, frames]` of a mono signal.
    pub fn forward(&self, signal: &[f32]) -> Result<Array2<Complex32>> {
        let padded = center_pad(signal, self.n_fft / 2);
        let frames = self.num_frames(signal.len());
        let mut spec = Array2::zeros((self.freq_bins(), frames));

        let mut input = self.forward.make_input_vec();
        let mut output = self.forward.make_output_vec();
        for t in 0..frames {
            let start = t * self.hop_length;
            for ((dst, &x), &w) in input
                .iter_mut()
                .zip(&padded[start..start + self.n_fft])
                .zip(&self.window)
            {
                *dst = x * w;
            }
            self.forward
                .process(&mut input, &mut output)
                .map_err(|e| BakeError::Transform(e.to_string()))?;
            spec.column_mut(t).assign(&ArrayView1::from(&output[..]));
        }
        Ok(spec)
    }

    /// Mono signal of `hop_length * (frames - 1)` samples from a `[bins, frames]` spectrogram.
    pub fn inverse(&self, spec: ArrayView2<Complex32>) -> Result<Vec<f32>> {
        let (bins, frames) = spec.dim();
        if bins != self.freq_bins() {
            return Err(BakeError::Transform(format!(
                "expected {} frequency bins, got {}",
                self.freq_bins(),
                bins
            )));
        }
        if frames == 0 {
            return Ok(Vec::new());
        }

        let full_len = self.n_fft + self.hop_length * (frames - 1);
        let mut signal = vec![0.0f32; full_len];
        let mut window_sum = vec![0.0f32; full_len];

        let mut input = self.inverse.make_input_vec();
        let mut output = self.inverse.make_output_vec();
        let scale = 1.0 / self.n_fft as f32;
        for (t, column) in spec.columns().into_iter().enumerate() {
            for (dst, &c) in input.iter_mut().zip(column.iter()) {
                *dst = c;
            }
            // DC and Nyquist have to be real for a real output.
            input[0].im = 0.0;
            if self.n_fft % 2 == 0 {
                input[bins - 1].im = 0.0;
            }
            self.inverse
                .process(&mut input, &mut output)
                .map_err(|e| BakeError::Transform(e.to_string()))?;

            let start = t * self.hop_length;
            for (i, (&x, &w)) in output.iter().zip(&self.window).enumerate() {
                signal[start + i] += x * scale * w;
                window_sum[start + i] += w * w;
            }
        }

        for (x, &w) in signal.iter_mut().zip(&window_sum) {
            if w > f32::MIN_POSITIVE {
                *x /= w;
            }
        }

        let half = self.n_fft / 2;
        Ok(signal[half..full_len - half].to_vec())
    }

    /// Transforms each channel of a `[channels, samples]` waveform independently and stacks them.
    pub fn spectrogram(&self, wave: &Array2<f32>) -> Result<Spectrogram> {
        let channels = wave
            .outer_iter()
            .map(|channel| channel.to_vec())
            .collect::<Vec<_>>()
            .par_iter()
            .map(|channel| self.forward(channel))
            .collect::<Result<Vec<_>>>()?;

        let frames = self.num_frames(wave.ncols());
        let mut spec = Array3::zeros((channels.len(), self.freq_bins(), frames));
        for (mut dst, channel) in spec.outer_iter_mut().zip(&channels) {
            dst.assign(channel);
        }
        Ok(spec)
    }

    /// Inverse of [`Stft::spectrogram`], channel by channel.
    pub fn waveform(&self, spec: &Spectrogram) -> Result<Array2<f32>> {
        let channels = spec
            .axis_iter(Axis(0))
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|channel| self.inverse(channel))
            .collect::<Result<Vec<_>>>()?;

        let len = channels.first().map(Vec::len).unwrap_or(0);
        let mut wave = Array2::zeros((channels.len(), len));
        for (mut row, channel) in wave.outer_iter_mut().zip(&channels) {
            row.assign(&ArrayView1::from(&channel[..]));
        }
        Ok(wave)
    }
}

/// Pads `pad` samples on each side, mirroring around the edge samples. Falls back to zeros when
/// the signal is too short to mirror.
fn center_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    let len = signal.len();
    let mut padded = vec![0.0f32; len + 2 * pad];
    padded[pad..pad + len].copy_from_slice(signal);
    if len > pad {
        for i in 0..pad {
            padded[i] = signal[pad - i];
            padded[pad + len + i] = signal[len - 2 - i];
        }
    }
    padded
}
