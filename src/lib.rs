//! Spectral patch datasets for training a mix/target source-separation model.
//!
//! File pairs are turned into cached complex spectrograms ([`cache`]), which are then cut into
//! randomly placed, augmented training patches ([`training`]) or a fixed validation tiling that
//! lives on disk ([`validation`]). Between epochs the training set can be blended ([`mixup`]) or
//! topped up with the examples that currently lose the most ([`oracle`]).

pub mod align;
pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod filelist;
pub mod mask;
pub mod mixup;
pub mod oracle;
pub mod padding;
pub mod progress;
pub mod stats;
pub mod stft;
pub mod training;
pub mod validation;

use ndarray::Array3;
pub use realfft::num_complex::Complex32;

pub use cache::SpectrogramCache;
pub use error::{BakeError, Result};
pub use filelist::AudioPair;

/// Complex spectrogram shaped `[channels, n_fft / 2 + 1, frames]`.
pub type Spectrogram = Array3<Complex32>;
