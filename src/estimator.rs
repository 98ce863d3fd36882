//! Spectral method-of-moments estimator for discrete HMMs.
//!
//! Runs the full pipeline once per call: moments, subspaces, a randomly
//! rotated joint diagonalization, and parameter recovery. There is no
//! iteration, likelihood evaluation or state kept between calls; the only
//! randomness comes from the caller-supplied generator.

use crate::config::SpectralConfig;
use crate::diagonalization::{form_b312, form_l, sample_rotation_matrix};
use crate::errors::{validate_num_states, validate_sequence_length, SpectralError, SpectralResult};
use crate::moments::{compute_moments, EmpiricalMoments, MIN_SEQUENCE_LENGTH};
use crate::recovery::recover_parameters;
use crate::secure_rng::SecureRng;
use crate::subspace::extract_subspaces;
use nalgebra::DMatrix;
use num_complex::Complex64;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Numerical diagnostics gathered during one estimate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EstimationDiagnostics {
    /// Sequence length `N`, `None` when estimating from precomputed moments
    pub num_observations: Option<usize>,
    /// Observation dimension `D`
    pub observation_dim: usize,
    /// Number of hidden states `k`
    pub num_states: usize,
    /// Singular values of `P31`, descending
    pub p31_singular_values: Vec<f64>,
    /// Singular values of `P32`, descending
    pub p32_singular_values: Vec<f64>,
    /// Eigenvalues of `B312[0]` as `(re, im)` pairs
    pub eigenvalues: Vec<(f64, f64)>,
    /// Relative minimum eigenvalue gap of `B312[0]`
    pub min_eigengap: f64,
    /// Condition number of the eigenvector matrix `R3`
    pub r3_condition_number: f64,
    /// Largest imaginary part discarded from the emission matrix
    pub max_imaginary_emission: f64,
    /// Largest imaginary part discarded from the transition matrix
    pub max_imaginary_transition: f64,
    /// Whether `B312[0]` had eigenvalues with non-negligible imaginary parts
    pub complex_spectrum: bool,
}

/// Result of a spectral estimate.
#[derive(Debug, Clone)]
pub struct SpectralEstimate {
    /// `D x k` emission matrix (real part of `M2`)
    pub emission_probs: DMatrix<f64>,
    /// `k x k` column-stochastic transition matrix
    pub transmat: DMatrix<f64>,
    /// Rotation used for this estimate
    pub theta: DMatrix<f64>,
    /// Conditioning and residual diagnostics
    pub diagnostics: EstimationDiagnostics,
}

/// Configuration-only pipeline object; `estimate` takes `&self`.
#[derive(Debug, Clone, Default)]
pub struct SpectralEstimator {
    config: SpectralConfig,
}

impl SpectralEstimator {
    /// Create an estimator with the given configuration.
    pub fn new(config: SpectralConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// Generator seeded from `config.seed`, or from OS entropy when unset.
    pub fn default_rng(&self) -> SecureRng {
        match self.config.seed {
            Some(seed) => SecureRng::with_seed(seed),
            None => SecureRng::new(),
        }
    }

    /// Estimate `(emission_probs, transmat)` from an `N x D` observation matrix.
    ///
    /// Preconditions (`N >= 3`, `1 <= k <= D`, finite input) are checked before
    /// any computation.
    pub fn estimate<R: Rng + ?Sized>(
        &self,
        x: &DMatrix<f64>,
        k: usize,
        rng: &mut R,
    ) -> SpectralResult<SpectralEstimate> {
        self.config.validate()?;
        validate_sequence_length(x.nrows(), MIN_SEQUENCE_LENGTH)?;
        validate_num_states(k, x.ncols())?;

        let moments = compute_moments(x)?;
        self.run(&moments, k, Some(x.nrows()), rng)
    }

    /// Estimate from precomputed (or population) moments.
    pub fn estimate_from_moments<R: Rng + ?Sized>(
        &self,
        moments: &EmpiricalMoments,
        k: usize,
        rng: &mut R,
    ) -> SpectralResult<SpectralEstimate> {
        self.config.validate()?;
        let d = moments.p31.nrows();
        if moments.p312.dim() != d {
            return Err(SpectralError::DimensionMismatch {
                context: "estimate_from_moments".to_string(),
                expected: format!("P312 of side {}", d),
                actual: format!("side {}", moments.p312.dim()),
            });
        }
        validate_num_states(k, d)?;
        self.run(moments, k, None, rng)
    }

    fn run<R: Rng + ?Sized>(
        &self,
        moments: &EmpiricalMoments,
        k: usize,
        num_observations: Option<usize>,
        rng: &mut R,
    ) -> SpectralResult<SpectralEstimate> {
        let config = &self.config;

        let bases = extract_subspaces(&moments.p31, &moments.p32, k, config)?;
        let theta = sample_rotation_matrix(k, rng)?;
        let b312 = form_b312(moments, &bases, &theta, config)?;
        let joint = form_l(&b312, config)?;
        let recovered =
            recover_parameters(&bases.u2, &theta, &joint.l, &joint.r3, &bases.u3, config)?;

        let complex_spectrum = joint
            .eigenvalues
            .iter()
            .any(|z: &Complex64| z.im.abs() > config.imaginary_tolerance);
        if complex_spectrum {
            log::warn!("B312[0] has complex eigenvalues; discarding imaginary parts at recovery");
        }

        let diagnostics = EstimationDiagnostics {
            num_observations,
            observation_dim: moments.p31.nrows(),
            num_states: k,
            p31_singular_values: bases.p31_singular_values,
            p32_singular_values: bases.p32_singular_values,
            eigenvalues: joint.eigenvalues.iter().map(|z| (z.re, z.im)).collect(),
            min_eigengap: joint.min_eigengap,
            r3_condition_number: joint.r3_condition_number,
            max_imaginary_emission: recovered.max_imaginary_emission,
            max_imaginary_transition: recovered.max_imaginary_transition,
            complex_spectrum,
        };
        log::debug!("Spectral estimate finished: {:?}", diagnostics);

        Ok(SpectralEstimate {
            emission_probs: recovered.emission_probs,
            transmat: recovered.transmat,
            theta,
            diagnostics,
        })
    }
}

/// Estimate with the default configuration.
pub fn estimate<R: Rng + ?Sized>(
    x: &DMatrix<f64>,
    k: usize,
    rng: &mut R,
) -> SpectralResult<SpectralEstimate> {
    SpectralEstimator::default().estimate(x, k, rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{match_states, max_abs_difference, permute_emission, permute_transition};
    use crate::generators::DiscreteHmm;
    use assert_approx_eq::assert_approx_eq;

    fn three_state_model() -> DiscreteHmm {
        DiscreteHmm::with_stationary_start(
            DMatrix::from_row_slice(
                3,
                3,
                &[0.7, 0.1, 0.2, 0.2, 0.8, 0.1, 0.1, 0.1, 0.7],
            ),
            DMatrix::from_row_slice(
                4,
                3,
                &[
                    0.6, 0.1, 0.1, //
                    0.2, 0.6, 0.1, //
                    0.1, 0.2, 0.2, //
                    0.1, 0.1, 0.6,
                ],
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_exact_recovery_from_population_moments() {
        let model = three_state_model();
        let moments = model.population_moments();
        let estimator = SpectralEstimator::default();

        for seed in 0..5 {
            let mut rng = SecureRng::with_seed(seed);
            let estimate = estimator.estimate_from_moments(&moments, 3, &mut rng).unwrap();

            let perm = match_states(&estimate.emission_probs, model.emission()).unwrap();
            let emission = permute_emission(&estimate.emission_probs, &perm).unwrap();
            let transmat = permute_transition(&estimate.transmat, &perm).unwrap();

            assert!(max_abs_difference(&emission, model.emission()).unwrap() < 1e-6);
            assert!(max_abs_difference(&transmat, model.transmat()).unwrap() < 1e-6);
            assert!(estimate.diagnostics.max_imaginary_emission < 1e-8);
            assert!(!estimate.diagnostics.complex_spectrum);
            assert_eq!(estimate.diagnostics.num_observations, None);
        }
    }

    #[test]
    fn test_transition_columns_sum_to_one() {
        let model = three_state_model();
        let x = model
            .sample_one_hot(20_000, &mut SecureRng::with_seed(21))
            .unwrap();
        let estimate = estimate(&x, 3, &mut SecureRng::with_seed(4)).unwrap();
        for column in estimate.transmat.column_iter() {
            assert_approx_eq!(column.sum(), 1.0, 1e-8);
        }
        assert_eq!(estimate.emission_probs.shape(), (4, 3));
        assert_eq!(estimate.diagnostics.num_observations, Some(20_000));
    }

    #[test]
    fn test_preconditions_checked_before_computation() {
        let x = DMatrix::<f64>::identity(5, 3);
        let mut rng = SecureRng::with_seed(0);
        assert!(matches!(
            estimate(&x, 0, &mut rng),
            Err(SpectralError::InvalidParameter { .. })
        ));
        assert!(matches!(
            estimate(&x, 4, &mut rng),
            Err(SpectralError::InvalidParameter { .. })
        ));
        let short = DMatrix::<f64>::identity(2, 3);
        assert!(matches!(
            estimate(&short, 1, &mut rng),
            Err(SpectralError::InsufficientData { required: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let estimator = SpectralEstimator::new(SpectralConfig {
            min_column_sum: f64::NAN,
            ..SpectralConfig::default()
        });
        let x = DMatrix::<f64>::identity(5, 3);
        assert!(estimator
            .estimate(&x, 1, &mut SecureRng::with_seed(0))
            .is_err());
    }

    #[test]
    fn test_default_rng_uses_configured_seed() {
        let estimator = SpectralEstimator::new(SpectralConfig::default().with_seed(17));
        assert_eq!(estimator.default_rng().seed(), Some(17));
        assert_eq!(SpectralEstimator::default().default_rng().seed(), None);
    }
}
