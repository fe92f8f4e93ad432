//! Forcing a separation mask open over long stretches where the reference carries no signal.

use ndarray::{Array1, Array3, Axis, s};

use crate::error::{BakeError, Result};

/// Sets `mask` to 1 over every run of more than `min_range` time frames whose `reference` mean is
/// below `thres`, fading in and out over `fade_area` frames at run edges that are not the edges
/// of the whole spectrogram.
///
/// Both arrays are `[channels, bins, frames]`.
pub fn mask_uninformative(
    mask: &mut Array3<f32>,
    reference: &Array3<f32>,
    thres: f32,
    min_range: usize,
    fade_area: usize,
) -> Result<()> {
    if min_range < fade_area * 2 {
        return Err(BakeError::Config(format!(
            "min_range ({}) must be at least twice fade_area ({})",
            min_range, fade_area
        )));
    }
    let width = mask.len_of(Axis(2));
    if reference.len_of(Axis(2)) != width {
        return Err(BakeError::Config(format!(
            "mask is {} frames wide but its reference is {}",
            width,
            reference.len_of(Axis(2))
        )));
    }

    let frame_mean = reference
        .mean_axis(Axis(0))
        .and_then(|r| r.mean_axis(Axis(0)))
        .unwrap_or_else(|| Array1::zeros(width));
    let quiet: Vec<usize> = frame_mean
        .iter()
        .enumerate()
        .filter(|&(_, &m)| m < thres)
        .map(|(t, _)| t)
        .collect();

    let fade_in = Array1::linspace(0.0f32, 1.0, fade_area);
    let fade_out = Array1::linspace(1.0f32, 0.0, fade_area);

    let mut old_end: Option<usize> = None;
    for (start, end) in quiet_runs(&quiet) {
        // `end` is the last quiet frame of the run, inclusive.
        if end - start <= min_range {
            continue;
        }

        let mut start = start;
        match old_end {
            Some(prev) if start - prev < fade_area => start = prev.saturating_sub(fade_area * 2),
            _ if start != 0 => {
                mask.slice_mut(s![.., .., start..start + fade_area])
                    .zip_mut_with(&fade_in, |m, &f| *m = (*m + f).clamp(0.0, 1.0));
            }
            _ => {}
        }
        if end != width {
            mask.slice_mut(s![.., .., end - fade_area..end])
                .zip_mut_with(&fade_out, |m, &f| *m = (*m + f).clamp(0.0, 1.0));
        }
        if start + fade_area < end - fade_area {
            mask.slice_mut(s![.., .., start + fade_area..end - fade_area]).fill(1.0);
        }
        old_end = Some(end);
    }
    Ok(())
}

/// Contiguous runs in a sorted index list, as inclusive `(first, last)` pairs.
fn quiet_runs(idx: &[usize]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let Some(&first) = idx.first() else {
        return runs;
    };
    let (mut start, mut prev) = (first, first);
    for &i in &idx[1..] {
        if i != prev + 1 {
            runs.push((start, prev));
            start = i;
        }
        prev = i;
    }
    runs.push((start, prev));
    runs
}
