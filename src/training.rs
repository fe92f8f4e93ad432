//! In-memory training set of randomly placed, augmented patches.

use log::{info, warn};
use ndarray::{Array4, Axis, s};
use rand::Rng;

use crate::Complex32;
use crate::audio::AudioDecoder;
use crate::cache::SpectrogramCache;
use crate::config::{CHANNELS, PatchParams};
use crate::error::{BakeError, Result};
use crate::filelist::AudioPair;
use crate::padding::{make_padding, pad_time};
use crate::progress::file_bar;

/// Matched mix (`x`) and target (`y`) patches, both `[patches, channels, bins, cropsize]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub x: Array4<Complex32>,
    pub y: Array4<Complex32>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.x.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cuts `patches_per_file` patches out of every pair.
///
/// Each pair may first be swapped for one of its pitch variants. Patch positions are drawn
/// uniformly over the padded spectrogram, with replacement, so patches of the same file can
/// overlap. Every patch has its stereo channels reversed with probability one half, identically
/// for mix and target.
///
/// A pair whose padded spectrogram is no wider than `cropsize` is skipped with a warning and
/// contributes no patches. Decode and cache failures still abort the build.
///
/// The whole set is held in memory: `pairs.len() * patches_per_file` complex patches.
pub fn make_training_set<D, R>(
    cache: &SpectrogramCache<D>,
    pairs: &[AudioPair],
    params: &PatchParams,
    rng: &mut R,
) -> Result<TrainingSet>
where
    D: AudioDecoder,
    R: Rng + ?Sized,
{
    let bins = cache.params().freq_bins();
    let patches = params.patches_per_file;
    let cropsize = params.cropsize;
    let len_dataset = patches * pairs.len();

    let mut x_dataset = Array4::<Complex32>::zeros((len_dataset, CHANNELS, bins, cropsize));
    let mut y_dataset = Array4::<Complex32>::zeros((len_dataset, CHANNELS, bins, cropsize));

    let pb = file_bar(pairs.len(), "Cutting patches");
    let mut filled = 0;
    for pair in pairs {
        let source = pair.pick_variant(rng);
        let (x, y) = cache.resolve(&source)?;
        if x.dim() != y.dim() || x.dim().0 != CHANNELS || x.dim().1 != bins {
            return Err(BakeError::Config(format!(
                "spectrograms of {:?} do not match: {:?} vs {:?}",
                source.mix,
                x.dim(),
                y.dim()
            )));
        }

        let padding = make_padding(x.len_of(Axis(2)), cropsize, params.offset);
        let x_pad = pad_time(&x, &padding);
        let y_pad = pad_time(&y, &padding);
        let padded_width = x_pad.len_of(Axis(2));
        if padded_width <= cropsize {
            warn!(
                "skipping {:?}: padded width {} leaves no room for a {} frame patch",
                source.mix, padded_width, cropsize
            );
            pb.inc(1);
            continue;
        }

        for j in 0..patches {
            let idx = filled * patches + j;
            let start = rng.random_range(0..padded_width - cropsize);
            let x_crop = x_pad.slice(s![.., .., start..start + cropsize]);
            let y_crop = y_pad.slice(s![.., .., start..start + cropsize]);

            if rng.random_bool(0.5) {
                x_dataset.slice_mut(s![idx, .., .., ..]).assign(&x_crop.slice(s![..;-1, .., ..]));
                y_dataset.slice_mut(s![idx, .., .., ..]).assign(&y_crop.slice(s![..;-1, .., ..]));
            } else {
                x_dataset.slice_mut(s![idx, .., .., ..]).assign(&x_crop);
                y_dataset.slice_mut(s![idx, .., .., ..]).assign(&y_crop);
            }
        }
        filled += 1;
        pb.inc(1);
    }
    pb.finish_and_clear();

    let kept = filled * patches;
    if kept < len_dataset {
        x_dataset.slice_collapse(s![..kept, .., .., ..]);
        y_dataset.slice_collapse(s![..kept, .., .., ..]);
    }
    info!("cut {} training patches from {} of {} pairs", kept, filled, pairs.len());
    Ok(TrainingSet {
        x: x_dataset,
        y: y_dataset,
    })
}
