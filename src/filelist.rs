//! Listing mix/target pairs and splitting them into training and validation sets.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::config::{INPUT_EXTS, PITCH_VARIANTS, PitchVariant};
use crate::error::{BakeError, Result};

/// A mix and its isolated target, plus whichever pre-rendered variants of the two exist.
#[derive(Debug, Clone)]
pub struct AudioPair {
    pub mix: PathBuf,
    pub inst: PathBuf,
    variants: Vec<(PitchVariant, PathBuf, PathBuf)>,
}

// Membership is about the source files, not which variants were found for them.
impl PartialEq for AudioPair {
    fn eq(&self, other: &Self) -> bool {
        self.mix == other.mix && self.inst == other.inst
    }
}

impl Eq for AudioPair {}

impl AudioPair {
    pub fn new(mix: impl Into<PathBuf>, inst: impl Into<PathBuf>) -> Self {
        Self {
            mix: mix.into(),
            inst: inst.into(),
            variants: Vec::new(),
        }
    }

    /// Registers every configured variant whose mix and target files both exist on disk.
    pub fn with_variants(mut self) -> Self {
        for cfg in PITCH_VARIANTS {
            let mix = variant_path(&self.mix, cfg.suffix);
            let inst = variant_path(&self.inst, cfg.suffix);
            if mix.is_file() && inst.is_file() {
                self.variants.push((cfg.variant, mix, inst));
            }
        }
        self
    }

    pub fn with_variant(mut self, variant: PitchVariant, mix: impl Into<PathBuf>, inst: impl Into<PathBuf>) -> Self {
        self.variants.retain(|(v, _, _)| *v != variant);
        self.variants.push((variant, mix.into(), inst.into()));
        self
    }

    pub fn variant(&self, variant: PitchVariant) -> Option<AudioPair> {
        self.variants
            .iter()
            .find(|(v, _, _)| *v == variant)
            .map(|(_, mix, inst)| AudioPair::new(mix, inst))
    }

    /// Draws which recording of this pair to use. Each configured variant is taken with its
    /// probability; the rest of the time, or when the drawn variant was never rendered, the
    /// original pair is returned.
    pub fn pick_variant<R: Rng + ?Sized>(&self, rng: &mut R) -> AudioPair {
        let p: f64 = rng.random();
        let mut cumulative = 0.0;
        for cfg in PITCH_VARIANTS {
            cumulative += cfg.probability;
            if p < cumulative {
                return match self.variant(cfg.variant) {
                    Some(pair) => {
                        debug!("using {:?} of {:?}", cfg.variant, self.mix);
                        pair
                    }
                    None => AudioPair::new(&self.mix, &self.inst),
                };
            }
        }
        AudioPair::new(&self.mix, &self.inst)
    }

    /// File stem of the mix, used to name everything derived from this pair.
    pub fn basename(&self) -> String {
        file_stem(&self.mix)
    }
}

pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `dir/song.mp3` -> `dir/song{suffix}.wav`
fn variant_path(path: &Path, suffix: &str) -> PathBuf {
    path.with_file_name(format!("{}{}.wav", file_stem(path), suffix))
}

fn list_audio(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| INPUT_EXTS.contains(e))
        })
        // Variants are reached through their source pair.
        .filter(|p| {
            let stem = file_stem(p);
            !PITCH_VARIANTS.iter().any(|cfg| stem.ends_with(cfg.suffix))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Pairs the sorted audio files of `mix_dir` with the sorted audio files of `inst_dir`.
pub fn make_pairs(mix_dir: &Path, inst_dir: &Path) -> Result<Vec<AudioPair>> {
    let mixes = list_audio(mix_dir)?;
    let insts = list_audio(inst_dir)?;
    if mixes.len() != insts.len() {
        return Err(BakeError::Config(format!(
            "{} mixes in {:?} but {} targets in {:?}",
            mixes.len(),
            mix_dir,
            insts.len(),
            inst_dir
        )));
    }

    Ok(mixes
        .into_iter()
        .zip(insts)
        .map(|(mix, inst)| AudioPair::new(mix, inst).with_variants())
        .collect())
}

/// One `[mix, inst]` entry of a pair list file.
#[derive(Debug, Deserialize)]
struct PairEntry(PathBuf, PathBuf);

impl From<PairEntry> for AudioPair {
    fn from(PairEntry(mix, inst): PairEntry) -> Self {
        AudioPair::new(mix, inst).with_variants()
    }
}

/// Reads a JSON list of `[mix, inst]` path pairs.
pub fn load_pair_list(path: &Path) -> Result<Vec<AudioPair>> {
    let reader = BufReader::new(File::open(path)?);
    let entries: Vec<PairEntry> = serde_json::from_reader(reader)?;
    Ok(entries.into_iter().map(AudioPair::from).collect())
}

/// Shuffles `pairs` and splits them into `(train, validation)`.
///
/// Without an override the last `floor(len * val_rate)` shuffled pairs go to validation. With one,
/// validation is exactly `val_override` and training is every listed pair not in it.
pub fn train_val_split<R: Rng + ?Sized>(
    mut pairs: Vec<AudioPair>,
    val_rate: f64,
    val_override: &[AudioPair],
    rng: &mut R,
) -> Result<(Vec<AudioPair>, Vec<AudioPair>)> {
    if !(0.0..=1.0).contains(&val_rate) {
        return Err(BakeError::Config(format!("val_rate must be within [0, 1], got {}", val_rate)));
    }
    pairs.shuffle(rng);

    let (train, val) = if val_override.is_empty() {
        let val_size = (pairs.len() as f64 * val_rate).floor() as usize;
        let val = pairs.split_off(pairs.len() - val_size);
        (pairs, val)
    } else {
        let train = pairs.into_iter().filter(|p| !val_override.contains(p)).collect();
        (train, val_override.to_vec())
    };

    info!("{} training pairs, {} validation pairs", train.len(), val.len());
    Ok((train, val))
}
