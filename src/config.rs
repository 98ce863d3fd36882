//! # Estimator Configuration
//!
//! Numerical tolerances controlling how strictly the spectral pipeline treats
//! ill-conditioned inverses, rank deficiency, degenerate spectra and residual
//! imaginary parts.

use crate::errors::{validate_parameter, SpectralError, SpectralResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerances and switches for spectral estimation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpectralConfig {
    /// Largest 2-norm condition number accepted for a required inverse
    pub max_condition_number: f64,
    /// Relative threshold `sigma_k / sigma_1` below which a moment matrix is rank deficient
    pub rank_tolerance: f64,
    /// Largest absolute imaginary residual accepted without a warning
    pub imaginary_tolerance: f64,
    /// Treat an imaginary residual above tolerance as an error instead of a warning
    pub fail_on_imaginary_residual: bool,
    /// Relative minimum eigenvalue gap of `B312[0]` below which a warning is logged
    pub eigengap_tolerance: f64,
    /// Transition column sums below this fraction of the column L1 norm mark a degenerate state
    pub min_column_sum: f64,
    /// Iteration cap for the real Schur eigen-solver
    pub max_schur_iterations: usize,
    /// Seed for [`crate::SpectralEstimator::default_rng`]
    pub seed: Option<u64>,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            max_condition_number: 1e12,
            rank_tolerance: 1e-10,
            imaginary_tolerance: 1e-6,
            fail_on_imaginary_residual: false,
            eigengap_tolerance: 1e-8,
            min_column_sum: 1e-12,
            max_schur_iterations: 10_000,
            seed: None,
        }
    }
}

impl SpectralConfig {
    /// Strict configuration: tighter conditioning, imaginary residuals are errors.
    pub fn strict() -> Self {
        Self {
            max_condition_number: 1e8,
            rank_tolerance: 1e-8,
            imaginary_tolerance: 1e-8,
            fail_on_imaginary_residual: true,
            eigengap_tolerance: 1e-6,
            min_column_sum: 1e-10,
            ..Self::default()
        }
    }

    /// Relaxed configuration for small or noisy samples.
    pub fn relaxed() -> Self {
        Self {
            max_condition_number: 1e14,
            rank_tolerance: 1e-13,
            imaginary_tolerance: 1e-3,
            fail_on_imaginary_residual: false,
            eigengap_tolerance: 1e-10,
            min_column_sum: 1e-14,
            ..Self::default()
        }
    }

    /// Builder-style seed setter.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check that every tolerance is finite and in range.
    pub fn validate(&self) -> SpectralResult<()> {
        if !(self.max_condition_number.is_finite() && self.max_condition_number >= 1.0) {
            return Err(SpectralError::InvalidParameter {
                parameter: "max_condition_number".to_string(),
                value: self.max_condition_number,
                constraint: "finite and >= 1".to_string(),
            });
        }

        let non_negative = [
            ("rank_tolerance", self.rank_tolerance),
            ("imaginary_tolerance", self.imaginary_tolerance),
            ("eigengap_tolerance", self.eigengap_tolerance),
            ("min_column_sum", self.min_column_sum),
        ];
        // Upper bound f64::MAX also excludes +inf
        for (name, value) in non_negative {
            validate_parameter(value, 0.0, f64::MAX, name)?;
        }

        if self.max_schur_iterations == 0 {
            return Err(SpectralError::InvalidParameter {
                parameter: "max_schur_iterations".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        Ok(())
    }
}
