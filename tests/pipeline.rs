//! End-to-end checks of the cache, the samplers and the validation tiling, driven by a synthetic
//! decoder so no audio files are needed.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array2, Axis, s};
use rand::SeedableRng;
use rand::rngs::StdRng;

use patchbake::audio::AudioDecoder;
use patchbake::config::{PatchParams, SpectrogramParams};
use patchbake::padding::{make_padding, pad_time};
use patchbake::{AudioPair, BakeError, Result, SpectrogramCache, stats, training, validation};

const PARAMS: SpectrogramParams = SpectrogramParams {
    sample_rate: 8000,
    hop_length: 128,
    n_fft: 256,
};

const PATCHES: PatchParams = PatchParams {
    cropsize: 32,
    patches_per_file: 5,
    offset: 8,
};

/// Deterministic stereo noise keyed by file stem, so a mix and a target with the same stem decode
/// to identical waveforms. Stems containing "broken" fail to decode, and stems containing "short"
/// last only a few frames.
#[derive(Default)]
struct SyntheticDecoder {
    calls: AtomicUsize,
}

impl AudioDecoder for SyntheticDecoder {
    fn decode(&self, path: &Path, sample_rate: u32) -> Result<Array2<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        if stem.contains("broken") {
            return Err(BakeError::Decode {
                path: path.to_path_buf(),
                reason: "synthetic failure".into(),
            });
        }

        let seed = stem.bytes().fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
        let len = if stem.contains("short") {
            500
        } else {
            sample_rate as usize * 2 + stem.len() * 1000
        };
        let mut state = [seed, seed ^ 0x9e37_79b9];
        Ok(Array2::from_shape_fn((2, len), |(ch, _)| {
            state[ch] = state[ch].wrapping_mul(1664525).wrapping_add(1013904223);
            (state[ch] >> 8) as f32 / (1u32 << 24) as f32 - 0.5
        }))
    }
}

fn pair(root: &Path, name: &str) -> AudioPair {
    AudioPair::new(root.join("mix").join(format!("{name}.wav")), root.join("inst").join(format!("{name}.wav")))
}

fn cache() -> SpectrogramCache<SyntheticDecoder> {
    SpectrogramCache::with_decoder(SyntheticDecoder::default(), PARAMS)
}

fn calls(cache: &SpectrogramCache<SyntheticDecoder>) -> usize {
    cache.decoder().calls.load(Ordering::SeqCst)
}

#[test]
fn cache_hit_returns_the_same_spectrograms_without_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache();
    let song = pair(dir.path(), "song");

    let (x1, y1) = cache.resolve(&song).unwrap();
    let (x_path, y_path) = cache.artifact_paths(&song);
    assert_eq!(x_path, dir.path().join("mix/sr8000_hl128_nf256/song.npy"));
    assert!(x_path.is_file() && y_path.is_file());
    assert_eq!(x1.dim().0, 2);
    assert_eq!(x1.dim().1, 129);
    assert_eq!(x1.dim(), y1.dim());

    assert_eq!(calls(&cache), 2);

    let (x2, y2) = cache.resolve(&song).unwrap();
    assert_eq!(x1, x2);
    assert_eq!(y1, y2);
    assert_eq!(calls(&cache), 2);

    // No temporary files survive the write.
    let leftovers: Vec<_> = fs::read_dir(x_path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, vec!["song.npy".to_string()]);
}

#[test]
fn second_resolve_does_no_decoding() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache();
    let pairs = [pair(dir.path(), "a"), pair(dir.path(), "bb")];

    cache.warm(&pairs).unwrap();
    let decoded = calls(&cache);
    assert_eq!(decoded, 4);

    for p in &pairs {
        cache.resolve(p).unwrap();
    }
    assert_eq!(calls(&cache), decoded);
}

#[test]
fn duplicated_pairs_are_cached_once() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache();
    let song = pair(dir.path(), "song");
    let pairs = [song.clone(), pair(dir.path(), "other"), song];

    cache.warm(&pairs).unwrap();
    assert_eq!(calls(&cache), 4);
    assert!(pairs.iter().all(|p| cache.is_cached(p)));
}

#[test]
fn failed_decode_leaves_no_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache();
    let bad = AudioPair::new(dir.path().join("mix/song.wav"), dir.path().join("inst/broken.wav"));

    let err = cache.resolve(&bad).unwrap_err();
    assert!(matches!(err, BakeError::Decode { .. }));
    let (x_path, y_path) = cache.artifact_paths(&bad);
    assert!(!x_path.exists());
    assert!(!y_path.exists());
}

#[test]
fn identical_sources_align_to_identical_spectrograms() {
    let dir = tempfile::tempdir().unwrap();
    let (x, y) = cache().resolve(&pair(dir.path(), "same")).unwrap();
    assert_eq!(x, y);
}

#[test]
fn training_patches_are_crops_of_the_padded_spectrogram() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache();
    let pairs = [pair(dir.path(), "one"), pair(dir.path(), "two"), pair(dir.path(), "three")];

    let set = training::make_training_set(&cache, &pairs, &PATCHES, &mut StdRng::seed_from_u64(7)).unwrap();
    assert_eq!(set.len(), 15);
    assert_eq!(set.x.shape(), &[15, 2, 129, 32]);
    assert_eq!(set.x.shape(), set.y.shape());
    // Same source for mix and target, so any mismatch would mean the pairing broke.
    assert_eq!(set.x, set.y);

    let (x, _) = cache.resolve(&pairs[0]).unwrap();
    let padding = make_padding(x.len_of(Axis(2)), PATCHES.cropsize, PATCHES.offset);
    let padded = pad_time(&x, &padding);
    let width = padded.len_of(Axis(2));

    for idx in 0..PATCHES.patches_per_file {
        let patch = set.x.slice(s![idx, .., .., ..]);
        let found = (0..width - PATCHES.cropsize).any(|start| {
            let crop = padded.slice(s![.., .., start..start + PATCHES.cropsize]);
            patch == crop || patch == crop.slice(s![..;-1, .., ..])
        });
        assert!(found, "patch {} is not a crop of its source", idx);
    }
}

#[test]
fn pairs_too_short_for_a_patch_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache();
    let pairs = [pair(dir.path(), "one"), pair(dir.path(), "short"), pair(dir.path(), "two")];

    let set = training::make_training_set(&cache, &pairs, &PATCHES, &mut StdRng::seed_from_u64(7)).unwrap();
    assert_eq!(set.len(), 2 * PATCHES.patches_per_file);
    assert_eq!(set.x.shape(), &[10, 2, 129, 32]);
    assert_eq!(set.x, set.y);
}

#[test]
fn seeded_training_sets_repeat() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache();
    let pairs = [pair(dir.path(), "one"), pair(dir.path(), "two")];

    let a = training::make_training_set(&cache, &pairs, &PATCHES, &mut StdRng::seed_from_u64(3)).unwrap();
    let b = training::make_training_set(&cache, &pairs, &PATCHES, &mut StdRng::seed_from_u64(3)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn validation_tiles_cover_every_frame_once() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let cache = cache();
    let song = pair(dir.path(), "song");

    let set = validation::make_validation_set(&cache, std::slice::from_ref(&song), &PATCHES, &out).unwrap();
    let (x, y) = cache.resolve(&song).unwrap();
    let width = x.len_of(Axis(2));
    let roi = make_padding(width, PATCHES.cropsize, PATCHES.offset).roi_size;
    assert_eq!(roi, 16);
    assert_eq!(set.len(), width.div_ceil(roi));

    let tiling_dir = out.join("cs32_sr8000_hl128_nf256_of8");
    assert_eq!(set.paths()[0], tiling_dir.join("song_p0.npz"));

    // The inner regions, laid end to end, give back the spectrogram.
    let mut frame = 0;
    for j in 0..set.len() {
        let (tile_x, tile_y) = set.load_patch(j).unwrap();
        assert_eq!(tile_x.len_of(Axis(2)), PATCHES.cropsize);
        let take = roi.min(width - frame);
        let inner = PATCHES.offset..PATCHES.offset + take;
        assert_eq!(tile_x.slice(s![.., .., inner.clone()]), x.slice(s![.., .., frame..frame + take]));
        assert_eq!(tile_y.slice(s![.., .., inner]), y.slice(s![.., .., frame..frame + take]));
        frame += take;
    }
    assert_eq!(frame, width);

    let item = set.get(0).unwrap();
    assert_eq!(item.x_mag.dim(), (2, 129, 32));
    assert!(item.y_phase.iter().all(|&label| (1..=15).contains(&label)));
}

#[test]
fn validation_reruns_keep_existing_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let cache = cache();
    let pairs = [pair(dir.path(), "song")];

    let first = validation::make_validation_set(&cache, &pairs, &PATCHES, &out).unwrap();
    fs::write(&first.paths()[0], b"left alone").unwrap();

    let second = validation::make_validation_set(&cache, &pairs, &PATCHES, &out).unwrap();
    assert_eq!(first.paths(), second.paths());
    assert_eq!(fs::read(&second.paths()[0]).unwrap(), b"left alone");
}

#[test]
fn statistics_cover_every_bin() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache();
    let pairs = [pair(dir.path(), "one"), pair(dir.path(), "two")];

    let norm = stats::compute_statistics(&cache, &pairs).unwrap();
    assert_eq!(norm.mean.len(), 129);
    assert_eq!(norm.scale.len(), 129);
    assert!(norm.mean.iter().all(|&m| m >= 0.0));
    assert!(norm.scale.iter().all(|&s| s > 0.0));
}
