//! Validation set: a regular, non-overlapping tiling of every pair, written out patch by patch.
//!
//! Tiles go to `<out_root>/cs{cropsize}_sr{sr}_hl{hop}_nf{n_fft}_of{offset}/{stem}_p{j}.npz`, each
//! holding the mix as `X` and the target as `y`. Tiles that already exist are left alone, so a
//! rerun only pays for new pairs.

use std::f64::consts::PI;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::info;
use ndarray::{Array3, Axis, s};
use ndarray_npy::{NpzReader, NpzWriter};

use crate::audio::AudioDecoder;
use crate::cache::{SpectrogramCache, temp_path};
use crate::config::{PHASE_LABEL_EDGES, PHASE_LABEL_EPSILON, PatchParams};
use crate::error::{BakeError, Result};
use crate::filelist::AudioPair;
use crate::padding::{make_padding, pad_time};
use crate::progress::file_bar;
use crate::{Complex32, Spectrogram};

/// One validation patch, split into what the model sees and what it is scored against.
#[derive(Debug, Clone)]
pub struct ValidationItem {
    pub x_mag: Array3<f32>,
    pub x_phase: Array3<f32>,
    pub y_mag: Array3<f32>,
    /// Target phase as class labels, see [`phase_label`].
    pub y_phase: Array3<u8>,
}

pub struct ValidationSet {
    patches: Vec<PathBuf>,
    label_edges: Vec<f64>,
}

impl ValidationSet {
    pub fn new(patches: Vec<PathBuf>) -> Self {
        Self {
            patches,
            label_edges: phase_label_edges(),
        }
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.patches
    }

    /// Raw `(X, y)` spectrograms of patch `idx`.
    pub fn load_patch(&self, idx: usize) -> Result<(Spectrogram, Spectrogram)> {
        let path = self.patches.get(idx).ok_or_else(|| {
            BakeError::Config(format!("patch {} requested from a set of {}", idx, self.patches.len()))
        })?;
        let mut npz = NpzReader::new(BufReader::new(File::open(path)?))?;
        let x = read_entry(&mut npz, "X")?;
        let y = read_entry(&mut npz, "y")?;
        Ok((x, y))
    }

    pub fn get(&self, idx: usize) -> Result<ValidationItem> {
        let (x, y) = self.load_patch(idx)?;
        Ok(ValidationItem {
            x_mag: x.mapv(|c| c.norm()),
            x_phase: x.mapv(|c| c.arg()),
            y_mag: y.mapv(|c| c.norm()),
            y_phase: y.mapv(|c| phase_label((c.im as f64).atan2(c.re as f64), &self.label_edges)),
        })
    }
}

// numpy names entries `X.npy`; accept either spelling.
fn read_entry<R: std::io::Read + std::io::Seek>(npz: &mut NpzReader<R>, name: &str) -> Result<Spectrogram> {
    match npz.by_name::<_, ndarray::Ix3>(name) {
        Ok(array) => Ok(array),
        Err(_) => Ok(npz.by_name(&format!("{}.npy", name))?),
    }
}

/// `PHASE_LABEL_EDGES` evenly spaced edges over `[-pi, pi + eps]`.
pub fn phase_label_edges() -> Vec<f64> {
    let lo = -PI;
    let hi = PI + PHASE_LABEL_EPSILON;
    let steps = (PHASE_LABEL_EDGES - 1) as f64;
    (0..PHASE_LABEL_EDGES)
        .map(|i| lo + (hi - lo) * i as f64 / steps)
        .collect()
}

/// Index `i` with `edges[i - 1] <= angle < edges[i]`. Angles in `[-pi, pi]` land in `1..=15`.
pub fn phase_label(angle: f64, edges: &[f64]) -> u8 {
    edges.partition_point(|&e| e <= angle) as u8
}

/// Tiles every pair and returns the resulting set of patch files.
///
/// A pair whose spectrogram is `W` frames wide contributes `ceil(W / roi_size)` tiles; tile `j`
/// starts at frame `j * roi_size` of the padded spectrogram and is `cropsize` frames wide.
pub fn make_validation_set<D: AudioDecoder>(
    cache: &SpectrogramCache<D>,
    pairs: &[AudioPair],
    params: &PatchParams,
    out_root: &Path,
) -> Result<ValidationSet> {
    let outdir = out_root.join(params.tiling_dir_name(cache.params()));
    fs::create_dir_all(&outdir)?;

    let mut patch_list = Vec::new();
    let pb = file_bar(pairs.len(), "Tiling validation");
    for pair in pairs {
        let basename = pair.basename();
        let (x, y) = cache.resolve(pair)?;

        let width = x.len_of(Axis(2));
        let padding = make_padding(width, params.cropsize, params.offset);
        let x_pad = pad_time(&x, &padding);
        let y_pad = pad_time(&y, &padding);

        let tiles = width.div_ceil(padding.roi_size);
        for j in 0..tiles {
            let outpath = outdir.join(format!("{}_p{}.npz", basename, j));
            if !outpath.exists() {
                let start = j * padding.roi_size;
                let x_tile = x_pad.slice(s![.., .., start..start + params.cropsize]).to_owned();
                let y_tile = y_pad.slice(s![.., .., start..start + params.cropsize]).to_owned();
                write_tile(&outpath, &x_tile, &y_tile)?;
            }
            patch_list.push(outpath);
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("{} validation patches in {:?}", patch_list.len(), outdir);
    Ok(ValidationSet::new(patch_list))
}

fn write_tile(path: &Path, x: &Array3<Complex32>, y: &Array3<Complex32>) -> Result<()> {
    let tmp = temp_path(path);
    let written = (|| -> Result<()> {
        let mut npz = NpzWriter::new(BufWriter::new(File::create(&tmp)?));
        npz.add_array("X", x)?;
        npz.add_array("y", y)?;
        npz.finish()?;
        Ok(())
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_labels_cover_the_circle_with_fifteen_classes() {
        let edges = phase_label_edges();
        assert_eq!(edges.len(), 16);
        assert_eq!(phase_label(-PI, &edges), 1);
        assert_eq!(phase_label(0.0, &edges), 8);
        assert_eq!(phase_label(PI, &edges), 15);

        let labels: std::collections::BTreeSet<u8> = (0..=1000)
            .map(|i| phase_label(-PI + 2.0 * PI * i as f64 / 1000.0, &edges))
            .collect();
        assert_eq!(labels, (1..=15).collect());
    }

    #[test]
    fn negative_real_axis_gets_the_first_label() {
        // -0.0 imaginary parts put the angle at -pi, which f32 rounds to just below the first edge.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge_p0.npz");
        let x = Array3::from_elem((1, 1, 2), Complex32::new(1.0, 0.0));
        let y = Array3::from_elem((1, 1, 2), Complex32::new(-1.0, -0.0));
        write_tile(&path, &x, &y).unwrap();

        let item = ValidationSet::new(vec![path]).get(0).unwrap();
        assert!(item.y_phase.iter().all(|&label| label == 1));
    }

    #[test]
    fn tiles_round_trip_through_npz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song_p0.npz");
        let x = Array3::from_shape_fn((2, 3, 4), |(c, f, t)| Complex32::new(c as f32, (f * 4 + t) as f32));
        let y = x.mapv(|v| v * 0.5);
        write_tile(&path, &x, &y).unwrap();

        let set = ValidationSet::new(vec![path]);
        let (x2, y2) = set.load_patch(0).unwrap();
        assert_eq!(x2, x);
        assert_eq!(y2, y);

        let item = set.get(0).unwrap();
        assert_eq!(item.x_mag.dim(), (2, 3, 4));
        assert_eq!(item.x_mag[[1, 0, 0]], 1.0);
        assert_eq!(item.y_phase.dim(), (2, 3, 4));
        assert!(set.get(1).is_err());
    }
}
