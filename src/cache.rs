//! Disk-backed spectrogram cache.
//!
//! Each source file gets its spectrogram saved as `<source dir>/sr{sr}_hl{hop}_nf{n_fft}/{stem}.npy`.
//! Entries are found by name and transform parameters alone: replacing a source file in place
//! keeps serving the old spectrogram until its cache directory is deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::ParallelProgressIterator;
use log::{debug, info};
use ndarray_npy::{read_npy, write_npy};
use rayon::prelude::*;

use crate::Spectrogram;
use crate::align::align_waveforms;
use crate::audio::{AudioDecoder, SymphoniaDecoder};
use crate::config::SpectrogramParams;
use crate::error::Result;
use crate::filelist::{AudioPair, file_stem};
use crate::progress::file_bar;
use crate::stft::Stft;

pub struct SpectrogramCache<D = SymphoniaDecoder> {
    decoder: D,
    params: SpectrogramParams,
    stft: Stft,
}

impl SpectrogramCache<SymphoniaDecoder> {
    pub fn new(params: SpectrogramParams) -> Self {
        Self::with_decoder(SymphoniaDecoder, params)
    }
}

impl<D: AudioDecoder> SpectrogramCache<D> {
    pub fn with_decoder(decoder: D, params: SpectrogramParams) -> Self {
        Self {
            decoder,
            stft: Stft::new(params.n_fft, params.hop_length),
            params,
        }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn params(&self) -> &SpectrogramParams {
        &self.params
    }

    /// Where the mix and target spectrograms of `pair` live.
    pub fn artifact_paths(&self, pair: &AudioPair) -> (PathBuf, PathBuf) {
        (self.artifact_path(&pair.mix), self.artifact_path(&pair.inst))
    }

    fn artifact_path(&self, source: &Path) -> PathBuf {
        let dir = source.parent().unwrap_or_else(|| Path::new(""));
        dir.join(self.params.cache_dir_name())
            .join(format!("{}.npy", file_stem(source)))
    }

    pub fn is_cached(&self, pair: &AudioPair) -> bool {
        let (x_path, y_path) = self.artifact_paths(pair);
        x_path.is_file() && y_path.is_file()
    }

    /// Returns the `(mix, target)` spectrograms of `pair`, computing and saving them first when
    /// either one is missing from the cache.
    pub fn resolve(&self, pair: &AudioPair) -> Result<(Spectrogram, Spectrogram)> {
        let (x_path, y_path) = self.artifact_paths(pair);
        if x_path.is_file() && y_path.is_file() {
            debug!("cache hit for {:?}", pair.mix);
            let x: Spectrogram = read_npy(&x_path)?;
            let y: Spectrogram = read_npy(&y_path)?;
            return Ok((x, y));
        }

        debug!("cache miss for {:?}, transforming", pair.mix);
        let (x, y) = self.transform(pair)?;

        for path in [&x_path, &y_path] {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
        }
        persist_pair(&x_path, &x, &y_path, &y)?;
        Ok((x, y))
    }

    /// Decodes, aligns and transforms a pair without touching the cache.
    pub fn transform(&self, pair: &AudioPair) -> Result<(Spectrogram, Spectrogram)> {
        let sr = self.params.sample_rate;
        let mix = self.decoder.decode(&pair.mix, sr)?;
        let inst = self.decoder.decode(&pair.inst, sr)?;
        let (mix, inst) = align_waveforms(&mix, &inst, sr)?;

        let x = self.stft.spectrogram(&mix)?;
        let y = self.stft.spectrogram(&inst)?;
        Ok((x, y))
    }

    /// Fills the cache for every pair that is not in it yet, several pairs at a time.
    pub fn warm(&self, pairs: &[AudioPair]) -> Result<()> {
        let mut missing: Vec<&AudioPair> = Vec::new();
        for pair in pairs {
            if !self.is_cached(pair) && !missing.contains(&pair) {
                missing.push(pair);
            }
        }
        info!("{} of {} pairs need spectrograms", missing.len(), pairs.len());
        if missing.is_empty() {
            return Ok(());
        }

        let pb = file_bar(missing.len(), "Caching spectrograms");
        missing
            .into_par_iter()
            .progress_with(pb)
            .try_for_each(|pair| self.resolve(pair).map(|_| ()))
    }
}

/// Writes both spectrograms under temporary names first, so an interrupted write never leaves
/// behind a half entry that a later run would mistake for a hit.
fn persist_pair(x_path: &Path, x: &Spectrogram, y_path: &Path, y: &Spectrogram) -> Result<()> {
    let x_tmp = temp_path(x_path);
    let y_tmp = temp_path(y_path);

    if let Err(e) = write_npy(&x_tmp, x).and_then(|_| write_npy(&y_tmp, y)) {
        let _ = fs::remove_file(&x_tmp);
        let _ = fs::remove_file(&y_tmp);
        return Err(e.into());
    }

    fs::rename(&x_tmp, x_path)?;
    fs::rename(&y_tmp, y_path)?;
    Ok(())
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hidden sibling of `path`, unique per call across threads and processes.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_sit_next_to_their_sources() {
        let cache = SpectrogramCache::new(SpectrogramParams::default());
        let pair = AudioPair::new("/data/mix/song.mp3", "/data/inst/song.wav");
        let (x, y) = cache.artifact_paths(&pair);
        assert_eq!(x, Path::new("/data/mix/sr44100_hl1024_nf2048/song.npy"));
        assert_eq!(y, Path::new("/data/inst/sr44100_hl1024_nf2048/song.npy"));
    }

    #[test]
    fn temporary_names_are_hidden_siblings() {
        let tmp = temp_path(Path::new("/cache/song.npy"));
        assert_eq!(tmp.parent(), Some(Path::new("/cache")));
        let name = tmp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".song.npy."));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn concurrent_writers_never_share_a_temporary_name() {
        let target = Path::new("/cache/song.npy");
        let names: std::collections::HashSet<PathBuf> = (0..64)
            .into_par_iter()
            .map(|_| temp_path(target))
            .collect();
        assert_eq!(names.len(), 64);
    }
}
