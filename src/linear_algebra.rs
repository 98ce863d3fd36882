//! Linear algebra operations for spectral estimation
//!
//! Thin checked wrappers around nalgebra's decompositions: inverses that refuse
//! ill-conditioned input, condition numbers, and a general eigendecomposition
//! of real non-symmetric matrices returning complex eigenpairs.

use crate::errors::{SpectralError, SpectralResult};
use nalgebra::{DMatrix, DVector, Schur, SVD};
use num_complex::Complex64;

/// Eigenpairs of a real, generally non-symmetric, square matrix.
#[derive(Debug, Clone)]
pub struct GeneralEigen {
    /// Eigenvalues, in the order of the real Schur form's diagonal blocks
    pub eigenvalues: DVector<Complex64>,
    /// Unit-norm eigenvectors as columns, matching `eigenvalues`
    pub eigenvectors: DMatrix<Complex64>,
}

/// Validates that a matrix contains no NaN or Inf values
pub fn ensure_finite_matrix(a: &DMatrix<f64>, operation: &str) -> SpectralResult<()> {
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            let val = a[(i, j)];
            if !val.is_finite() {
                return Err(SpectralError::NumericalError {
                    reason: format!("Non-finite value ({}) at position [{},{}]", val, i, j),
                    operation: Some(operation.to_string()),
                });
            }
        }
    }
    Ok(())
}

fn ensure_square(rows: usize, cols: usize, operation: &str) -> SpectralResult<()> {
    if rows != cols || rows == 0 {
        return Err(SpectralError::DimensionMismatch {
            context: operation.to_string(),
            expected: "non-empty square matrix".to_string(),
            actual: format!("{}x{}", rows, cols),
        });
    }
    Ok(())
}

fn condition_from_singular_values(singular_values: &DVector<f64>) -> f64 {
    let max = singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let min = singular_values.iter().cloned().fold(f64::INFINITY, f64::min);
    if !(min > 0.0) || !max.is_finite() {
        f64::INFINITY
    } else {
        max / min
    }
}

/// 2-norm condition number of a real matrix, infinite when singular.
pub fn condition_number(a: &DMatrix<f64>) -> f64 {
    condition_from_singular_values(&a.singular_values())
}

/// 2-norm condition number of a complex matrix, infinite when singular.
pub fn complex_condition_number(a: &DMatrix<Complex64>) -> f64 {
    condition_from_singular_values(&a.singular_values())
}

/// Inverse of a real square matrix, refused above `max_condition`.
pub fn checked_inverse(
    a: &DMatrix<f64>,
    operation: &str,
    max_condition: f64,
) -> SpectralResult<DMatrix<f64>> {
    ensure_square(a.nrows(), a.ncols(), operation)?;
    ensure_finite_matrix(a, operation)?;

    let condition = condition_number(a);
    if condition > max_condition {
        return Err(SpectralError::SingularMatrix {
            operation: operation.to_string(),
            condition_number: condition,
        });
    }

    a.clone()
        .try_inverse()
        .ok_or_else(|| SpectralError::SingularMatrix {
            operation: operation.to_string(),
            condition_number: f64::INFINITY,
        })
}

/// Inverse of a complex square matrix, refused above `max_condition`.
pub fn checked_complex_inverse(
    a: &DMatrix<Complex64>,
    operation: &str,
    max_condition: f64,
) -> SpectralResult<DMatrix<Complex64>> {
    ensure_square(a.nrows(), a.ncols(), operation)?;
    if a.iter().any(|z| !(z.re.is_finite() && z.im.is_finite())) {
        return Err(SpectralError::NumericalError {
            reason: "Non-finite complex entry".to_string(),
            operation: Some(operation.to_string()),
        });
    }

    let condition = complex_condition_number(a);
    if condition > max_condition {
        return Err(SpectralError::SingularMatrix {
            operation: operation.to_string(),
            condition_number: condition,
        });
    }

    a.clone()
        .try_inverse()
        .ok_or_else(|| SpectralError::SingularMatrix {
            operation: operation.to_string(),
            condition_number: f64::INFINITY,
        })
}

/// Lift a real matrix into the complex field.
pub fn to_complex(a: &DMatrix<f64>) -> DMatrix<Complex64> {
    a.map(|x| Complex64::new(x, 0.0))
}

/// Real part of a complex matrix.
pub fn real_part(a: &DMatrix<Complex64>) -> DMatrix<f64> {
    a.map(|z| z.re)
}

/// Largest absolute imaginary part, zero for an empty matrix.
pub fn max_abs_imaginary(a: &DMatrix<Complex64>) -> f64 {
    a.iter().map(|z| z.im.abs()).fold(0.0, f64::max)
}

/// Eigendecomposition of a real square matrix that may have complex eigenpairs.
///
/// Eigenvalues come from the real Schur form. Each eigenvector is the right
/// singular vector of `A - lambda I` for its smallest singular value, rotated
/// so its largest-modulus entry is real and positive, then scaled to unit norm.
/// Repeated eigenvalues yield repeated eigenvectors; callers that invert the
/// eigenvector matrix detect this as a singular matrix.
pub fn general_eigen(
    a: &DMatrix<f64>,
    max_iterations: usize,
    operation: &str,
) -> SpectralResult<GeneralEigen> {
    let n = a.nrows();
    ensure_square(n, a.ncols(), operation)?;
    ensure_finite_matrix(a, operation)?;

    let schur = Schur::try_new(a.clone(), f64::EPSILON, max_iterations).ok_or_else(|| {
        SpectralError::DecompositionFailed {
            decomposition: "Schur".to_string(),
            operation: operation.to_string(),
        }
    })?;
    let eigenvalues = schur.complex_eigenvalues();

    let a_complex = to_complex(a);
    let identity = DMatrix::<Complex64>::identity(n, n);
    let mut eigenvectors = DMatrix::<Complex64>::zeros(n, n);

    for (j, &lambda) in eigenvalues.iter().enumerate() {
        let shifted = &a_complex - &identity * lambda;
        let svd = SVD::try_new(shifted, false, true, f64::EPSILON, max_iterations).ok_or_else(
            || SpectralError::DecompositionFailed {
                decomposition: "SVD".to_string(),
                operation: operation.to_string(),
            },
        )?;
        let v_t = svd.v_t.ok_or_else(|| SpectralError::DecompositionFailed {
            decomposition: "SVD".to_string(),
            operation: operation.to_string(),
        })?;

        let smallest = svd
            .singular_values
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, &s)| if s < best.1 { (i, s) } else { best })
            .0;

        let mut v: DVector<Complex64> = v_t.row(smallest).adjoint();
        let pivot = v
            .iter()
            .enumerate()
            .fold((0, -1.0), |best, (i, z)| if z.norm() > best.1 { (i, z.norm()) } else { best })
            .0;
        let pivot_value = v[pivot];
        if pivot_value.norm() > 0.0 {
            v *= pivot_value.conj() / pivot_value.norm();
        }
        let v = v.normalize();
        eigenvectors.set_column(j, &v);
    }

    Ok(GeneralEigen {
        eigenvalues,
        eigenvectors,
    })
}

/// Smallest pairwise eigenvalue distance relative to the spectral radius.
///
/// Infinite for fewer than two eigenvalues.
pub fn relative_eigengap(eigenvalues: &DVector<Complex64>) -> f64 {
    let n = eigenvalues.len();
    if n < 2 {
        return f64::INFINITY;
    }

    let radius = eigenvalues.iter().map(|z| z.norm()).fold(0.0, f64::max);
    let mut min_gap = f64::INFINITY;
    for i in 0..n {
        for j in (i + 1)..n {
            min_gap = min_gap.min((eigenvalues[i] - eigenvalues[j]).norm());
        }
    }

    if radius > 0.0 {
        min_gap / radius
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_inverse_identity_roundtrip() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 7.0, 2.0, 6.0]);
        let inv = checked_inverse(&a, "test", 1e12).unwrap();
        let product = &a * &inv;
        assert!((product - DMatrix::<f64>::identity(2, 2)).norm() < 1e-12);
    }

    #[test]
    fn test_checked_inverse_rejects_singular() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        match checked_inverse(&a, "singular_case", 1e12) {
            Err(SpectralError::SingularMatrix { operation, .. }) => {
                assert_eq!(operation, "singular_case");
            }
            other => panic!("Expected SingularMatrix, got {:?}", other),
        }
    }

    #[test]
    fn test_checked_inverse_rejects_non_square() {
        let a = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(
            checked_inverse(&a, "rect", 1e12),
            Err(SpectralError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_ensure_finite_matrix() {
        let mut a = DMatrix::<f64>::identity(3, 3);
        assert!(ensure_finite_matrix(&a, "ok").is_ok());
        a[(1, 2)] = f64::NAN;
        match ensure_finite_matrix(&a, "nan") {
            Err(SpectralError::NumericalError { reason, operation }) => {
                assert!(reason.contains("[1,2]"));
                assert_eq!(operation.as_deref(), Some("nan"));
            }
            other => panic!("Expected NumericalError, got {:?}", other),
        }
    }

    #[test]
    fn test_general_eigen_real_spectrum() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 0.0, 3.0]);
        let eig = general_eigen(&a, 1000, "test").unwrap();
        let a_c = to_complex(&a);

        for j in 0..2 {
            let v = eig.eigenvectors.column(j).into_owned();
            let residual = &a_c * &v - &v * eig.eigenvalues[j];
            assert!(residual.norm() < 1e-10);
            assert!((v.norm() - 1.0).abs() < 1e-12);
        }

        let mut values: Vec<f64> = eig.eigenvalues.iter().map(|z| z.re).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((values[0] - 2.0).abs() < 1e-10);
        assert!((values[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_general_eigen_complex_spectrum() {
        // Rotation by 90 degrees: eigenvalues +/- i
        let a = DMatrix::from_row_slice(2, 2, &[0.0, -1.0, 1.0, 0.0]);
        let eig = general_eigen(&a, 1000, "rotation").unwrap();
        let a_c = to_complex(&a);

        for j in 0..2 {
            assert!((eig.eigenvalues[j].norm() - 1.0).abs() < 1e-10);
            assert!(eig.eigenvalues[j].re.abs() < 1e-10);
            let v = eig.eigenvectors.column(j).into_owned();
            let residual = &a_c * &v - &v * eig.eigenvalues[j];
            assert!(residual.norm() < 1e-10);
        }
        assert!(complex_condition_number(&eig.eigenvectors) < 10.0);
    }

    #[test]
    fn test_relative_eigengap() {
        let eigs = DVector::from_vec(vec![
            Complex64::new(1.0, 0.0),
            Complex64::new(0.5, 0.0),
            Complex64::new(0.45, 0.0),
        ]);
        assert!((relative_eigengap(&eigs) - 0.05).abs() < 1e-12);

        let single = DVector::from_vec(vec![Complex64::new(1.0, 0.0)]);
        assert!(relative_eigengap(&single).is_infinite());
    }

    #[test]
    fn test_real_and_imaginary_parts() {
        let a = DMatrix::from_row_slice(
            1,
            2,
            &[Complex64::new(1.0, -0.25), Complex64::new(2.0, 0.1)],
        );
        assert_eq!(real_part(&a), DMatrix::from_row_slice(1, 2, &[1.0, 2.0]));
        assert!((max_abs_imaginary(&a) - 0.25).abs() < 1e-15);
    }
}
