//! Recovery of the emission and transition matrices.
//!
//! ```text
//! M2             = U2 theta^{-1} L
//! emission_probs = Re(M2)
//! transmat       = column_normalize(Re((U3^T emission_probs)^{-1} R3))
//! ```
//!
//! Imaginary parts are carried until this stage and discarded here; their
//! magnitude is reported because a large residual signals a poor choice of
//! `k` or noisy moments.

use crate::config::SpectralConfig;
use crate::errors::{SpectralError, SpectralResult};
use crate::linear_algebra::{checked_inverse, max_abs_imaginary, real_part, to_complex};
use nalgebra::DMatrix;
use num_complex::Complex64;

/// Slack allowed outside `[0, 1]` before a normalized entry is reported.
const PROBABILITY_SLACK: f64 = 1e-6;

/// Real parameters recovered from a joint diagonalization.
#[derive(Debug, Clone)]
pub struct RecoveredParameters {
    /// `D x k` emission matrix, one column per hidden state
    pub emission_probs: DMatrix<f64>,
    /// `k x k` column-stochastic transition matrix
    pub transmat: DMatrix<f64>,
    /// Largest imaginary part discarded from `M2`
    pub max_imaginary_emission: f64,
    /// Largest imaginary part discarded from the raw transition matrix
    pub max_imaginary_transition: f64,
}

fn check_imaginary_residual(
    matrix: &str,
    residual: f64,
    config: &SpectralConfig,
) -> SpectralResult<()> {
    if residual <= config.imaginary_tolerance {
        return Ok(());
    }
    if config.fail_on_imaginary_residual {
        return Err(SpectralError::ImaginaryResidual {
            matrix: matrix.to_string(),
            residual,
            tolerance: config.imaginary_tolerance,
        });
    }
    log::warn!(
        "Discarding imaginary residual {:.3e} from {} (tolerance {:.3e}); rank or moment estimates may be poor",
        residual,
        matrix,
        config.imaginary_tolerance
    );
    Ok(())
}

/// Scale each column to sum to one.
///
/// A column whose sum is non-finite, or smaller in magnitude than
/// `min_column_sum` times the column's L1 norm, marks a degenerate state and is
/// reported instead of divided. Columns that normalize to entries outside
/// `[0, 1]` are kept but logged, since they are not probability vectors.
pub fn normalize_columns(m: &DMatrix<f64>, min_column_sum: f64) -> SpectralResult<DMatrix<f64>> {
    let mut out = m.clone();
    for (j, mut column) in out.column_iter_mut().enumerate() {
        let sum = column.sum();
        let l1_norm: f64 = column.iter().map(|v| v.abs()).sum();
        if !sum.is_finite() || l1_norm == 0.0 || sum.abs() < min_column_sum * l1_norm {
            return Err(SpectralError::DegenerateState {
                state: j,
                column_sum: sum,
            });
        }
        column /= sum;

        let (lowest, highest) = column
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if lowest < -PROBABILITY_SLACK || highest > 1.0 + PROBABILITY_SLACK {
            log::warn!(
                "Column {} normalizes to entries in [{:.3e}, {:.3e}]; state {} is poorly identified",
                j,
                lowest,
                highest,
                j
            );
        }
    }
    Ok(out)
}

/// Rebuild `(emission_probs, transmat)` from the subspace bases, the rotation
/// and the joint diagonalization.
pub fn recover_parameters(
    u2: &DMatrix<f64>,
    theta: &DMatrix<f64>,
    l: &DMatrix<Complex64>,
    r3: &DMatrix<Complex64>,
    u3: &DMatrix<f64>,
    config: &SpectralConfig,
) -> SpectralResult<RecoveredParameters> {
    let k = theta.nrows();
    if u2.ncols() != k || u3.ncols() != k || l.shape() != (k, k) || r3.shape() != (k, k) {
        return Err(SpectralError::DimensionMismatch {
            context: "recover_parameters".to_string(),
            expected: format!("U2, U3 with {} columns; L, R3 {}x{}", k, k, k),
            actual: format!(
                "U2 {:?}, U3 {:?}, L {:?}, R3 {:?}",
                u2.shape(),
                u3.shape(),
                l.shape(),
                r3.shape()
            ),
        });
    }

    let theta_inv = checked_inverse(theta, "rotation_inverse", config.max_condition_number)?;
    let m2 = to_complex(&(u2 * theta_inv)) * l;
    let max_imaginary_emission = max_abs_imaginary(&m2);
    check_imaginary_residual("emission_probs", max_imaginary_emission, config)?;
    let emission_probs = real_part(&m2);

    let projected = u3.transpose() * &emission_probs;
    let projected_inv = checked_inverse(
        &projected,
        "projected_emission_inverse",
        config.max_condition_number,
    )?;
    let raw_transition = to_complex(&projected_inv) * r3;
    let max_imaginary_transition = max_abs_imaginary(&raw_transition);
    check_imaginary_residual("transmat", max_imaginary_transition, config)?;
    let transmat = normalize_columns(&real_part(&raw_transition), config.min_column_sum)?;

    Ok(RecoveredParameters {
        emission_probs,
        transmat,
        max_imaginary_emission,
        max_imaginary_transition,
    })
}
