//! Top-`k` singular subspaces of the second-order moments.
//!
//! `U3` spans the leading left singular vectors of `P31`, `U1` its leading
//! right singular vectors, and `U2` the leading right singular vectors of
//! `P32`. When `k` equals the true number of hidden states these bases
//! approximate the column spaces of the conditional-mean matrices.

use crate::config::SpectralConfig;
use crate::errors::{validate_num_states, SpectralError, SpectralResult};
use crate::linear_algebra::ensure_finite_matrix;
use nalgebra::{DMatrix, DVector, SVD};

/// Orthonormal `D x k` bases extracted from `P31` and `P32`.
#[derive(Debug, Clone)]
pub struct SubspaceBases {
    /// Right singular vectors of `P31`
    pub u1: DMatrix<f64>,
    /// Right singular vectors of `P32`
    pub u2: DMatrix<f64>,
    /// Left singular vectors of `P31`
    pub u3: DMatrix<f64>,
    /// All singular values of `P31`, descending
    pub p31_singular_values: Vec<f64>,
    /// All singular values of `P32`, descending
    pub p32_singular_values: Vec<f64>,
}

/// Leading singular vectors of one moment matrix.
struct TruncatedSvd {
    left: DMatrix<f64>,
    right: DMatrix<f64>,
    singular_values: Vec<f64>,
}

fn truncated_svd(
    p: &DMatrix<f64>,
    k: usize,
    config: &SpectralConfig,
    operation: &str,
) -> SpectralResult<TruncatedSvd> {
    ensure_finite_matrix(p, operation)?;

    let svd = SVD::try_new(p.clone(), true, true, f64::EPSILON, config.max_schur_iterations)
        .ok_or_else(|| SpectralError::DecompositionFailed {
            decomposition: "SVD".to_string(),
            operation: operation.to_string(),
        })?;
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(SpectralError::DecompositionFailed {
                decomposition: "SVD".to_string(),
                operation: operation.to_string(),
            })
        }
    };

    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| {
        svd.singular_values[b]
            .partial_cmp(&svd.singular_values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let singular_values: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();

    let leading = singular_values.first().copied().unwrap_or(0.0);
    let threshold = config.rank_tolerance * leading;
    let numerical_rank = singular_values
        .iter()
        .filter(|&&s| s > threshold && s > 0.0)
        .count();
    if numerical_rank < k {
        return Err(SpectralError::RankDeficient {
            operation: operation.to_string(),
            requested: k,
            numerical_rank,
        });
    }

    let d = p.nrows();
    let mut left = DMatrix::<f64>::zeros(d, k);
    let mut right = DMatrix::<f64>::zeros(p.ncols(), k);
    for (col, &idx) in order.iter().take(k).enumerate() {
        left.set_column(col, &u.column(idx));
        let v: DVector<f64> = v_t.row(idx).transpose();
        right.set_column(col, &v);
    }

    Ok(TruncatedSvd {
        left,
        right,
        singular_values,
    })
}

/// Extract `U1`, `U2`, `U3` for `k` hidden states.
///
/// `k` outside `[1, D]` is rejected, as is a `k` exceeding the numerical
/// rank of either moment matrix.
pub fn extract_subspaces(
    p31: &DMatrix<f64>,
    p32: &DMatrix<f64>,
    k: usize,
    config: &SpectralConfig,
) -> SpectralResult<SubspaceBases> {
    let d = p31.nrows();
    if p31.shape() != (d, d) || p32.shape() != (d, d) {
        return Err(SpectralError::DimensionMismatch {
            context: "extract_subspaces".to_string(),
            expected: format!("{}x{} moment matrices", d, d),
            actual: format!("P31 {:?}, P32 {:?}", p31.shape(), p32.shape()),
        });
    }
    validate_num_states(k, d)?;

    let svd31 = truncated_svd(p31, k, config, "svd_p31")?;
    let svd32 = truncated_svd(p32, k, config, "svd_p32")?;

    log::debug!(
        "Subspaces for k={}: P31 singular values {:?}, P32 singular values {:?}",
        k,
        svd31.singular_values,
        svd32.singular_values
    );

    Ok(SubspaceBases {
        u1: svd31.right,
        u2: svd32.right,
        u3: svd31.left,
        p31_singular_values: svd31.singular_values,
        p32_singular_values: svd32.singular_values,
    })
}
