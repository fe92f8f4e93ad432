//! Configuration for how the patch datasets are baked.
//!
//! Every file pair is first turned into a pair of complex spectrograms, which are cached next to
//! the source audio under a directory named after the transform parameters. The training set is
//! then cut out of those spectrograms at random positions, while the validation set is tiled on a
//! regular grid and written out patch by patch.
//!
//! Changing any of the transform parameters below lands the spectrograms in a fresh cache
//! directory. Editing a source file in place does NOT: the cache is keyed by name and parameters
//! only, so delete the matching `sr*_hl*_nf*` directory by hand after replacing audio.

use phf::phf_set;

pub const SAMPLE_RATE: u32 = 44100;
pub const HOP_LENGTH: usize = 1024;
pub const N_FFT: usize = 2048;

// Everything downstream assumes stereo.
pub const CHANNELS: usize = 2;

// Width in frames of a single patch.
pub const CROPSIZE: usize = 256;
pub const PATCHES_PER_FILE: usize = 16;
// Frames on each side of a validation tile that are context only. The inner
// `CROPSIZE - 2 * OFFSET` frames are what the tiling steps over.
pub const OFFSET: usize = 64;

pub const VAL_RATE: f64 = 0.1;

// Share of the training set that gets blended with a neighbour, and the Beta
// concentration used for the blend factor.
pub const MIXUP_RATE: f64 = 0.0;
pub const MIXUP_ALPHA: f32 = 1.0;

// Share of a pass that is re-injected as hard examples, and how much of the
// hard pool is left out so the oracle set does not go stale.
pub const ORACLE_RATE: f64 = 0.0;
pub const ORACLE_DROP_RATE: f64 = 0.5;

// Only the head of each waveform is used to estimate the lag between mix and target.
pub const ALIGN_WINDOW_SECONDS: usize = 4;
pub const TRIM_TOP_DB: f32 = 60.0;
pub const TRIM_FRAME_LENGTH: usize = 2048;
pub const TRIM_HOP_LENGTH: usize = 512;

// Edges of the target phase classes: 16 edges give 15 classes over [-pi, pi + eps].
pub const PHASE_LABEL_EDGES: usize = 16;
pub const PHASE_LABEL_EPSILON: f64 = 1e-6;

/// Extensions picked up when listing the mix and target directories.
pub static INPUT_EXTS: phf::Set<&'static str> = phf_set! {
    "wav", "m4a", "3gp", "oma", "mp3", "mp4", "flac",
};

/// Pre-rendered augmentations of a source file, living next to it as `{stem}{suffix}.wav`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchVariant {
    SemitoneDown,
    SemitoneUp,
}

pub struct VariantConfig {
    pub variant: PitchVariant,
    pub suffix: &'static str,
    pub probability: f64,
}

/// Checked in order against a single uniform draw; whatever probability is left over keeps the
/// original recording.
pub const PITCH_VARIANTS: &[VariantConfig] = &[
    VariantConfig {
        variant: PitchVariant::SemitoneDown,
        suffix: "_pitch-1",
        probability: 0.1,
    },
    VariantConfig {
        variant: PitchVariant::SemitoneUp,
        suffix: "_pitch1",
        probability: 0.1,
    },
];

// Inputs and outputs of the bake binary. Make sure to update these with your own paths before
// running!
pub const MIX_DIR: &str = "dataset/mixtures";
pub const INST_DIR: &str = "dataset/instruments";
// JSON list of [mix, inst] pairs. When the file exists, it is the validation set verbatim.
pub const VAL_FILELIST: &str = "dataset/val_filelist.json";
pub const OUTPUT_DIR: &str = "baked_patches";

// Fix this to make the split, the patch positions and every augmentation reproducible.
pub const SEED: Option<u64> = None;

/// Parameters of the waveform to spectrogram conversion. These alone decide the cache directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectrogramParams {
    pub sample_rate: u32,
    pub hop_length: usize,
    pub n_fft: usize,
}

impl Default for SpectrogramParams {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            hop_length: HOP_LENGTH,
            n_fft: N_FFT,
        }
    }
}

impl SpectrogramParams {
    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// e.g. `sr44100_hl1024_nf2048`
    pub fn cache_dir_name(&self) -> String {
        format!("sr{}_hl{}_nf{}", self.sample_rate, self.hop_length, self.n_fft)
    }
}

/// Geometry of the patches cut out of a spectrogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchParams {
    pub cropsize: usize,
    pub patches_per_file: usize,
    pub offset: usize,
}

impl Default for PatchParams {
    fn default() -> Self {
        Self {
            cropsize: CROPSIZE,
            patches_per_file: PATCHES_PER_FILE,
            offset: OFFSET,
        }
    }
}

impl PatchParams {
    /// e.g. `cs256_sr44100_hl1024_nf2048_of64`
    pub fn tiling_dir_name(&self, spec: &SpectrogramParams) -> String {
        format!(
            "cs{}_sr{}_hl{}_nf{}_of{}",
            self.cropsize, spec.sample_rate, spec.hop_length, spec.n_fft, self.offset
        )
    }
}
