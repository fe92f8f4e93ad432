use std::ops::{Add, Mul};

use ndarray::{Array, Axis, RemoveAxis};
use rand::Rng;
use rand::seq::index;
use rand_distr::{Beta, Distribution};

use crate::error::{BakeError, Result};

/// Blends `floor(N * rate)` randomly chosen examples with a neighbour, in place.
///
/// The chosen indices are walked in random order; entry `i` becomes
/// `lam * entry_i + (1 - lam) * entry_{i+1}` with `lam ~ Beta(alpha, alpha)`, using the same `lam`
/// for mix and target. The last chosen index only ever serves as a neighbour. Every neighbour is
/// read before its own turn comes, so each blend sees unblended inputs.
pub fn mixup<A, D, R>(x: &mut Array<A, D>, y: &mut Array<A, D>, rate: f64, alpha: f32, rng: &mut R) -> Result<()>
where
    A: Copy + Add<Output = A> + Mul<f32, Output = A>,
    D: RemoveAxis,
    R: Rng + ?Sized,
{
    let n_total = x.len_of(Axis(0));
    if y.len_of(Axis(0)) != n_total {
        return Err(BakeError::Config(format!(
            "mixup needs matching sets, got {} mixes and {} targets",
            n_total,
            y.len_of(Axis(0))
        )));
    }
    if !(0.0..=1.0).contains(&rate) {
        return Err(BakeError::Config(format!("mixup rate must be within [0, 1], got {}", rate)));
    }
    let beta = Beta::new(alpha, alpha).map_err(|e| BakeError::Config(format!("mixup alpha {}: {}", alpha, e)))?;

    let amount = (n_total as f64 * rate).floor() as usize;
    let perm = index::sample(rng, n_total, amount).into_vec();
    for pair in perm.windows(2) {
        let (dst, src) = (pair[0], pair[1]);
        let lam: f32 = beta.sample(rng);
        blend(x, dst, src, lam);
        blend(y, dst, src, lam);
    }
    Ok(())
}

fn blend<A, D>(data: &mut Array<A, D>, dst: usize, src: usize, lam: f32)
where
    A: Copy + Add<Output = A> + Mul<f32, Output = A>,
    D: RemoveAxis,
{
    let other = data.index_axis(Axis(0), src).to_owned();
    data.index_axis_mut(Axis(0), dst)
        .zip_mut_with(&other, |a, &b| *a = *a * lam + b * (1.0 - lam));
}
