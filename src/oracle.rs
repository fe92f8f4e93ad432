//! Picking hard examples out of a finished pass for re-injection into training.

use log::debug;
use ndarray::{Array, Axis, Dimension, RemoveAxis};
use rand::Rng;
use rand::seq::index;

use crate::error::{BakeError, Result};

/// Copies of the selected examples, with their positions in the source arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleSelection<A, D: Dimension> {
    pub x: Array<A, D>,
    pub y: Array<A, D>,
    pub indices: Vec<usize>,
}

/// Samples `floor(N * oracle_rate)` distinct examples, uniformly, from the
/// `floor(N * oracle_rate / (1 - oracle_drop_rate))` examples with the highest loss.
///
/// `oracle_drop_rate` is the share of that hard pool that goes unpicked each time, so the oracle
/// examples do not freeze into one fixed set.
pub fn select_oracle<A, D, R>(
    x: &Array<A, D>,
    y: &Array<A, D>,
    instance_loss: &[f32],
    oracle_rate: f64,
    oracle_drop_rate: f64,
    rng: &mut R,
) -> Result<OracleSelection<A, D>>
where
    A: Clone,
    D: RemoveAxis,
    R: Rng + ?Sized,
{
    let n_total = x.len_of(Axis(0));
    if y.len_of(Axis(0)) != n_total || instance_loss.len() != n_total {
        return Err(BakeError::Config(format!(
            "oracle inputs disagree: {} mixes, {} targets, {} losses",
            n_total,
            y.len_of(Axis(0)),
            instance_loss.len()
        )));
    }
    if !(0.0..=1.0).contains(&oracle_rate) {
        return Err(BakeError::Config(format!("oracle_rate must be within [0, 1], got {}", oracle_rate)));
    }
    if !(0.0..1.0).contains(&oracle_drop_rate) {
        return Err(BakeError::Config(format!(
            "oracle_drop_rate must be within [0, 1), got {}",
            oracle_drop_rate
        )));
    }

    let pool = ((n_total as f64 * oracle_rate / (1.0 - oracle_drop_rate)).floor() as usize).min(n_total);
    let requested = (n_total as f64 * oracle_rate).floor() as usize;
    if pool < requested {
        return Err(BakeError::InsufficientPool { pool, requested });
    }

    // Hardest first.
    let mut ranked: Vec<usize> = (0..n_total).collect();
    ranked.sort_by(|&a, &b| instance_loss[b].total_cmp(&instance_loss[a]));
    ranked.truncate(pool);

    let indices: Vec<usize> = index::sample(rng, pool, requested)
        .into_iter()
        .map(|i| ranked[i])
        .collect();
    debug!("picked {} oracle examples out of the {} hardest", indices.len(), pool);

    Ok(OracleSelection {
        x: x.select(Axis(0), &indices),
        y: y.select(Axis(0), &indices),
        indices,
    })
}
