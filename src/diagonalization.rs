//! Randomized joint diagonalization of the whitened third-order moments.
//!
//! A random rotation `theta` picks `k` directions `eta_j = U2 theta_j` in the
//! middle-view subspace (`theta_j` is row `j` of `theta`). Each direction
//! yields
//!
//! ```text
//! B312[j] = (U3^T P312(eta_j) U1) (U3^T P31 U1)^{-1}
//! ```
//!
//! With population moments the family shares one eigenbasis, so the
//! eigenvectors `R3` of `B312[0]` diagonalize every member. Row `i` of `L`
//! holds `diag(R3^{-1} B312[i] R3)`.
//!
//! `B312[0]` is assumed to have `k` distinct eigenvalues. Near-repeated
//! eigenvalues are reported through [`JointDiagonalization::min_eigengap`]
//! and a warning; no recovery is attempted.

use crate::config::SpectralConfig;
use crate::errors::{SpectralError, SpectralResult};
use crate::linear_algebra::{
    checked_complex_inverse, checked_inverse, complex_condition_number, general_eigen,
    relative_eigengap, to_complex,
};
use crate::moments::EmpiricalMoments;
use crate::subspace::SubspaceBases;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rand::Rng;
use rand_distr::StandardNormal;

/// Output of the joint diagonalization step.
#[derive(Debug, Clone)]
pub struct JointDiagonalization {
    /// `k x k`; row `i` is the diagonal of `R3^{-1} B312[i] R3`
    pub l: DMatrix<Complex64>,
    /// `k x k` eigenvector matrix of `B312[0]`
    pub r3: DMatrix<Complex64>,
    /// Eigenvalues of `B312[0]` (row 0 of `l`)
    pub eigenvalues: DVector<Complex64>,
    /// Smallest pairwise eigenvalue gap of `B312[0]`, relative to its spectral radius
    pub min_eigengap: f64,
    /// 2-norm condition number of `r3`
    pub r3_condition_number: f64,
}

/// Sample a uniformly random `k x k` rotation (orthogonal, determinant +1).
///
/// A standard-normal matrix is QR-factored; the columns of `Q` are multiplied
/// by the signs of `diag(R)` to make the factorization unique, and when the
/// result is a reflection its first two columns are swapped (for `k = 1` the
/// single entry is negated instead).
pub fn sample_rotation_matrix<R: Rng + ?Sized>(
    k: usize,
    rng: &mut R,
) -> SpectralResult<DMatrix<f64>> {
    if k == 0 {
        return Err(SpectralError::InvalidParameter {
            parameter: "num_states".to_string(),
            value: 0.0,
            constraint: ">= 1".to_string(),
        });
    }

    let gaussian = DMatrix::<f64>::from_fn(k, k, |_, _| rng.sample::<f64, _>(StandardNormal));
    let qr = gaussian.qr();
    let r = qr.r();
    let mut theta = qr.q();

    for j in 0..k {
        if r[(j, j)] < 0.0 {
            theta.column_mut(j).scale_mut(-1.0);
        }
    }

    if theta.determinant() < 0.0 {
        if k >= 2 {
            theta.swap_columns(0, 1);
        } else {
            theta[(0, 0)] = -theta[(0, 0)];
        }
    }

    Ok(theta)
}

/// Form the family `B312[j]` for every row of `theta`.
pub fn form_b312(
    moments: &EmpiricalMoments,
    bases: &SubspaceBases,
    theta: &DMatrix<f64>,
    config: &SpectralConfig,
) -> SpectralResult<Vec<DMatrix<f64>>> {
    let k = bases.u1.ncols();
    if theta.shape() != (k, k) {
        return Err(SpectralError::DimensionMismatch {
            context: "form_b312".to_string(),
            expected: format!("{}x{} rotation", k, k),
            actual: format!("{}x{}", theta.nrows(), theta.ncols()),
        });
    }

    let u3_t = bases.u3.transpose();
    let whitened_p31 = &u3_t * &moments.p31 * &bases.u1;
    let whitened_inverse =
        checked_inverse(&whitened_p31, "whitened_p31_inverse", config.max_condition_number)?;

    let mut family = Vec::with_capacity(k);
    for j in 0..k {
        let eta: DVector<f64> = &bases.u2 * theta.row(j).transpose();
        let slice = moments.p312.contract_last(&eta)?;
        family.push(&u3_t * slice * &bases.u1 * &whitened_inverse);
    }
    Ok(family)
}

/// Diagonalize the family with the eigenvectors of its first member.
pub fn form_l(
    b312: &[DMatrix<f64>],
    config: &SpectralConfig,
) -> SpectralResult<JointDiagonalization> {
    let k = b312.len();
    if k == 0 {
        return Err(SpectralError::InvalidParameter {
            parameter: "b312".to_string(),
            value: 0.0,
            constraint: "at least one matrix".to_string(),
        });
    }
    if let Some(bad) = b312.iter().find(|b| b.shape() != (k, k)) {
        return Err(SpectralError::DimensionMismatch {
            context: "form_l".to_string(),
            expected: format!("{}x{} matrices", k, k),
            actual: format!("{}x{}", bad.nrows(), bad.ncols()),
        });
    }

    let eigen = general_eigen(&b312[0], config.max_schur_iterations, "eigen_b312")?;

    let min_eigengap = relative_eigengap(&eigen.eigenvalues);
    if min_eigengap < config.eigengap_tolerance {
        log::warn!(
            "B312[0] has near-repeated eigenvalues (relative gap {:.3e}); eigenvectors are ill-determined",
            min_eigengap
        );
    }

    let r3 = eigen.eigenvectors;
    let r3_condition_number = complex_condition_number(&r3);
    let r3_inv =
        checked_complex_inverse(&r3, "eigenvector_inverse", config.max_condition_number)?;

    let mut l = DMatrix::<Complex64>::zeros(k, k);
    l.set_row(0, &eigen.eigenvalues.transpose());
    for (i, b) in b312.iter().enumerate().skip(1) {
        let conjugated = &r3_inv * to_complex(b) * &r3;
        l.set_row(i, &conjugated.diagonal().transpose());
    }

    log::debug!(
        "Joint diagonalization: eigenvalues {:?}, gap {:.3e}, cond(R3) {:.3e}",
        eigen.eigenvalues.as_slice(),
        min_eigengap,
        r3_condition_number
    );

    Ok(JointDiagonalization {
        l,
        r3,
        eigenvalues: eigen.eigenvalues,
        min_eigengap,
        r3_condition_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_rng::SecureRng;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_rotation_is_orthogonal_with_unit_determinant() {
        for k in 1..=6 {
            for seed in 0..25 {
                let mut rng = SecureRng::with_seed(seed);
                let theta = sample_rotation_matrix(k, &mut rng).unwrap();
                let gram = theta.transpose() * &theta;
                assert!((gram - DMatrix::<f64>::identity(k, k)).norm() < 1e-10);
                assert_approx_eq!(theta.determinant(), 1.0, 1e-10);
            }
        }
    }

    #[test]
    fn test_rotation_is_reproducible() {
        let a = sample_rotation_matrix(4, &mut SecureRng::with_seed(99)).unwrap();
        let b = sample_rotation_matrix(4, &mut SecureRng::with_seed(99)).unwrap();
        assert_eq!(a, b);
        let c = sample_rotation_matrix(4, &mut SecureRng::with_seed(100)).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_rotation_rejects_zero_dimension() {
        assert!(sample_rotation_matrix(0, &mut SecureRng::with_seed(1)).is_err());
    }

    /// Commuting family `V diag(d_j) V^{-1}` with known diagonals.
    fn commuting_family() -> (Vec<DMatrix<f64>>, Vec<Vec<f64>>) {
        let v = DMatrix::from_row_slice(3, 3, &[1.0, 0.5, 0.2, 0.3, 1.0, 0.4, 0.1, 0.6, 1.0]);
        let v_inv = v.clone().try_inverse().unwrap();
        let diagonals = vec![
            vec![1.0, 2.0, 3.0],
            vec![-0.5, 0.25, 4.0],
            vec![2.0, 2.0, -1.0],
        ];
        let family = diagonals
            .iter()
            .map(|d| &v * DMatrix::from_diagonal(&DVector::from_vec(d.clone())) * &v_inv)
            .collect();
        (family, diagonals)
    }

    #[test]
    fn test_form_l_recovers_shared_diagonals() {
        let (family, diagonals) = commuting_family();
        let joint = form_l(&family, &SpectralConfig::default()).unwrap();

        for i in 0..3 {
            let lead = joint.l[(0, i)];
            assert!(lead.im.abs() < 1e-10);
            let m = diagonals[0]
                .iter()
                .position(|&d| (d - lead.re).abs() < 1e-8)
                .expect("eigenvalue of B312[0] not found");
            for (row, d) in diagonals.iter().enumerate() {
                assert_approx_eq!(joint.l[(row, i)].re, d[m], 1e-8);
                assert!(joint.l[(row, i)].im.abs() < 1e-8);
            }
        }

        let b0 = to_complex(&family[0]);
        let lambda = DMatrix::from_diagonal(&joint.eigenvalues);
        let residual = &b0 * &joint.r3 - &joint.r3 * lambda;
        assert!(residual.norm() < 1e-8);
        assert!(joint.min_eigengap > 0.3);
    }

    #[test]
    fn test_form_l_carries_complex_spectrum() {
        // Scaled rotation has eigenvalues 1 +/- 2i; second member commutes with it
        let b0 = DMatrix::from_row_slice(2, 2, &[1.0, -2.0, 2.0, 1.0]);
        let b1 = DMatrix::<f64>::identity(2, 2) * 3.0;
        let joint = form_l(&[b0, b1], &SpectralConfig::default()).unwrap();

        for i in 0..2 {
            assert_approx_eq!(joint.l[(0, i)].re, 1.0, 1e-10);
            assert_approx_eq!(joint.l[(0, i)].im.abs(), 2.0, 1e-10);
            assert_approx_eq!(joint.l[(1, i)].re, 3.0, 1e-10);
        }
    }

    #[test]
    fn test_form_l_repeated_eigenvalues_surface_as_singular() {
        // A Jordan block has one eigenvector for a double eigenvalue
        let b0 = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]);
        let b1 = DMatrix::<f64>::identity(2, 2);
        assert!(matches!(
            form_l(&[b0, b1], &SpectralConfig::default()),
            Err(SpectralError::SingularMatrix { .. })
        ));
    }

    #[test]
    fn test_form_l_rejects_bad_shapes() {
        assert!(form_l(&[], &SpectralConfig::default()).is_err());
        let family = vec![DMatrix::<f64>::identity(2, 2), DMatrix::<f64>::identity(3, 3)];
        assert!(matches!(
            form_l(&family, &SpectralConfig::default()),
            Err(SpectralError::DimensionMismatch { .. })
        ));
    }
}
