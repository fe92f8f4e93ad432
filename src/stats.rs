//! Per-frequency normalization statistics over the mix spectrograms of a file list.

use indicatif::ParallelProgressIterator;
use log::info;
use ndarray::{Array1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::audio::AudioDecoder;
use crate::cache::SpectrogramCache;
use crate::error::{BakeError, Result};
use crate::filelist::AudioPair;
use crate::progress::file_bar;

/// Mean and standard deviation per frequency bin.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationStats {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

/// Running per-column mean and sum of squared deviations.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    pub count: u64,
    pub mean: Array1<f64>,
    pub m2: Array1<f64>,
}

impl RunningStats {
    pub fn new(features: usize) -> Self {
        Self {
            count: 0,
            mean: Array1::zeros(features),
            m2: Array1::zeros(features),
        }
    }

    /// Folds in a batch of samples, one per row.
    pub fn update(&mut self, samples: ArrayView2<f64>) -> Result<()> {
        if samples.nrows() == 0 {
            return Ok(());
        }
        let batch_mean = samples
            .mean_axis(Axis(0))
            .ok_or_else(|| BakeError::Config("empty batch".into()))?;
        let mut batch_m2 = Array1::<f64>::zeros(samples.ncols());
        for row in samples.rows() {
            batch_m2.zip_mut_with(&(&row - &batch_mean), |m, d| *m += d * d);
        }

        self.merge(&RunningStats {
            count: samples.nrows() as u64,
            mean: batch_mean,
            m2: batch_m2,
        })
    }

    /// Combines two partial results as if their samples had been seen by one accumulator.
    pub fn merge(&mut self, other: &RunningStats) -> Result<()> {
        if other.count == 0 {
            return Ok(());
        }
        if self.count == 0 {
            *self = other.clone();
            return Ok(());
        }
        if self.mean.len() != other.mean.len() {
            return Err(BakeError::Config(format!(
                "cannot merge statistics over {} and {} bins",
                self.mean.len(),
                other.mean.len()
            )));
        }

        let n_a = self.count as f64;
        let n_b = other.count as f64;
        let total = n_a + n_b;
        let delta = &other.mean - &self.mean;

        self.mean = &self.mean + &(&delta * (n_b / total));
        self.m2 = &self.m2 + &other.m2 + &(delta.mapv(|d| d * d) * (n_a * n_b / total));
        self.count += other.count;
        Ok(())
    }

    /// Population standard deviation as the scale; bins with no spread get a scale of 1.
    pub fn finish(&self) -> NormalizationStats {
        let n = self.count.max(1) as f64;
        let scale = self.m2.mapv(|m2| {
            let std = (m2 / n).sqrt();
            if std < 10.0 * f64::EPSILON { 1.0 } else { std }
        });
        NormalizationStats {
            mean: self.mean.clone(),
            scale,
        }
    }
}

/// Statistics of the channel-averaged mix magnitude, treating every time frame of every file as
/// one sample over the frequency bins.
pub fn compute_statistics<D: AudioDecoder>(
    cache: &SpectrogramCache<D>,
    pairs: &[AudioPair],
) -> Result<NormalizationStats> {
    let bins = cache.params().freq_bins();
    let pb = file_bar(pairs.len(), "Measuring statistics");

    let partials = pairs
        .par_iter()
        .progress_with(pb)
        .map(|pair| -> Result<RunningStats> {
            let (x, _) = cache.resolve(pair)?;
            let magnitude = x.mapv(|c| c.norm() as f64);
            // [bins, frames] -> one row per frame.
            let frames = magnitude
                .mean_axis(Axis(0))
                .ok_or_else(|| BakeError::Config(format!("{:?} has no channels", pair.mix)))?;
            let mut stats = RunningStats::new(bins);
            stats.update(frames.t())?;
            Ok(stats)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut total = RunningStats::new(bins);
    for partial in &partials {
        total.merge(partial)?;
    }
    info!("statistics over {} frames from {} files", total.count, pairs.len());
    Ok(total.finish())
}
