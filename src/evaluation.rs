//! Comparison of estimated parameters against a reference model.
//!
//! Spectral estimates identify hidden states only up to relabelling, so
//! estimated columns are first matched to reference columns.

use crate::errors::{SpectralError, SpectralResult};
use nalgebra::DMatrix;

/// Largest `k` for which every permutation is examined.
const EXHAUSTIVE_MATCH_LIMIT: usize = 8;

fn column_cost(estimated: &DMatrix<f64>, reference: &DMatrix<f64>) -> Vec<Vec<f64>> {
    let k = reference.ncols();
    (0..k)
        .map(|r| {
            (0..k)
                .map(|e| {
                    reference
                        .column(r)
                        .iter()
                        .zip(estimated.column(e).iter())
                        .map(|(a, b)| (a - b).abs())
                        .sum()
                })
                .collect()
        })
        .collect()
}

fn search_permutations(
    cost: &[Vec<f64>],
    depth: usize,
    used: &mut [bool],
    current: &mut Vec<usize>,
    current_cost: f64,
    best: &mut (f64, Vec<usize>),
) {
    if current_cost >= best.0 {
        return;
    }
    if depth == cost.len() {
        *best = (current_cost, current.clone());
        return;
    }
    for e in 0..cost.len() {
        if used[e] {
            continue;
        }
        used[e] = true;
        current.push(e);
        search_permutations(
            cost,
            depth + 1,
            used,
            current,
            current_cost + cost[depth][e],
            best,
        );
        current.pop();
        used[e] = false;
    }
}

/// Match estimated states to reference states by emission columns.
///
/// Returns `perm` with `perm[r]` the estimated state paired with reference
/// state `r`, minimizing the total absolute column difference. Exhaustive for
/// up to eight states, greedy beyond.
pub fn match_states(
    estimated_emission: &DMatrix<f64>,
    reference_emission: &DMatrix<f64>,
) -> SpectralResult<Vec<usize>> {
    if estimated_emission.shape() != reference_emission.shape() {
        return Err(SpectralError::DimensionMismatch {
            context: "match_states".to_string(),
            expected: format!("{:?}", reference_emission.shape()),
            actual: format!("{:?}", estimated_emission.shape()),
        });
    }

    let k = reference_emission.ncols();
    let cost = column_cost(estimated_emission, reference_emission);

    if k <= EXHAUSTIVE_MATCH_LIMIT {
        let mut best = (f64::INFINITY, (0..k).collect::<Vec<_>>());
        let mut used = vec![false; k];
        let mut current = Vec::with_capacity(k);
        search_permutations(&cost, 0, &mut used, &mut current, 0.0, &mut best);
        return Ok(best.1);
    }

    let mut used = vec![false; k];
    let mut perm = Vec::with_capacity(k);
    for row in &cost {
        let choice = (0..k)
            .filter(|&e| !used[e])
            .min_by(|&a, &b| row[a].partial_cmp(&row[b]).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or(0);
        used[choice] = true;
        perm.push(choice);
    }
    Ok(perm)
}

fn check_permutation(perm: &[usize], k: usize) -> SpectralResult<()> {
    let mut seen = vec![false; k];
    if perm.len() != k || perm.iter().any(|&p| p >= k || std::mem::replace(&mut seen[p], true)) {
        return Err(SpectralError::InvalidParameter {
            parameter: "permutation".to_string(),
            value: perm.len() as f64,
            constraint: format!("a permutation of 0..{}", k),
        });
    }
    Ok(())
}

/// Reorder emission columns so column `r` is estimated state `perm[r]`.
pub fn permute_emission(emission: &DMatrix<f64>, perm: &[usize]) -> SpectralResult<DMatrix<f64>> {
    check_permutation(perm, emission.ncols())?;
    Ok(DMatrix::from_fn(emission.nrows(), emission.ncols(), |i, r| {
        emission[(i, perm[r])]
    }))
}

/// Relabel both indices of a transition matrix by `perm`.
pub fn permute_transition(
    transmat: &DMatrix<f64>,
    perm: &[usize],
) -> SpectralResult<DMatrix<f64>> {
    let k = transmat.nrows();
    if transmat.ncols() != k {
        return Err(SpectralError::DimensionMismatch {
            context: "permute_transition".to_string(),
            expected: "square matrix".to_string(),
            actual: format!("{}x{}", transmat.nrows(), transmat.ncols()),
        });
    }
    check_permutation(perm, k)?;
    Ok(DMatrix::from_fn(k, k, |a, b| transmat[(perm[a], perm[b])]))
}

/// Largest absolute entrywise difference.
pub fn max_abs_difference(a: &DMatrix<f64>, b: &DMatrix<f64>) -> SpectralResult<f64> {
    if a.shape() != b.shape() {
        return Err(SpectralError::DimensionMismatch {
            context: "max_abs_difference".to_string(),
            expected: format!("{:?}", a.shape()),
            actual: format!("{:?}", b.shape()),
        });
    }
    Ok((a - b).amax())
}
