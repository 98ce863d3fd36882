//! Synthetic data from a known discrete hidden Markov model.
//!
//! [`DiscreteHmm`] holds column-stochastic parameters:
//! `transmat[(i, j)] = P(h_{t+1} = i | h_t = j)` and
//! `emission[(s, j)] = P(x_t = s | h_t = j)`. It samples symbol sequences and
//! evaluates the stationary population moments the spectral estimator
//! targets, which gives an exact reference for validation.

use crate::errors::{SpectralError, SpectralResult};
use crate::moments::{one_hot_encode, EmpiricalMoments, MomentTensor};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

const STOCHASTIC_TOLERANCE: f64 = 1e-9;
const STATIONARY_MAX_ITERATIONS: usize = 100_000;
const STATIONARY_TOLERANCE: f64 = 1e-14;

/// Discrete HMM with column-stochastic parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteHmm {
    initial: DVector<f64>,
    transmat: DMatrix<f64>,
    emission: DMatrix<f64>,
}

fn check_distribution(values: &[f64], context: &str) -> SpectralResult<()> {
    if let Some(&bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(SpectralError::InvalidParameter {
            parameter: context.to_string(),
            value: bad,
            constraint: "finite and >= 0".to_string(),
        });
    }
    let total: f64 = values.iter().sum();
    if (total - 1.0).abs() > STOCHASTIC_TOLERANCE {
        return Err(SpectralError::InvalidParameter {
            parameter: format!("sum of {}", context),
            value: total,
            constraint: "1".to_string(),
        });
    }
    Ok(())
}

fn draw_categorical<R: Rng + ?Sized>(probs: impl Iterator<Item = f64>, rng: &mut R) -> usize {
    let u: f64 = rng.gen();
    let mut cumulative = 0.0;
    let mut last = 0;
    for (i, p) in probs.enumerate() {
        cumulative += p;
        last = i;
        if u < cumulative {
            return i;
        }
    }
    last
}

impl DiscreteHmm {
    /// Build a model, validating shapes and stochasticity.
    pub fn new(
        initial: DVector<f64>,
        transmat: DMatrix<f64>,
        emission: DMatrix<f64>,
    ) -> SpectralResult<Self> {
        let k = transmat.nrows();
        if k == 0 || transmat.ncols() != k {
            return Err(SpectralError::DimensionMismatch {
                context: "DiscreteHmm transmat".to_string(),
                expected: "non-empty square matrix".to_string(),
                actual: format!("{}x{}", transmat.nrows(), transmat.ncols()),
            });
        }
        if emission.ncols() != k || emission.nrows() == 0 {
            return Err(SpectralError::DimensionMismatch {
                context: "DiscreteHmm emission".to_string(),
                expected: format!("D x {} with D >= 1", k),
                actual: format!("{}x{}", emission.nrows(), emission.ncols()),
            });
        }
        if initial.len() != k {
            return Err(SpectralError::DimensionMismatch {
                context: "DiscreteHmm initial".to_string(),
                expected: format!("length {}", k),
                actual: format!("length {}", initial.len()),
            });
        }

        check_distribution(initial.as_slice(), "initial")?;
        for (j, column) in transmat.column_iter().enumerate() {
            let values: Vec<f64> = column.iter().copied().collect();
            check_distribution(&values, &format!("transmat column {}", j))?;
        }
        for (j, column) in emission.column_iter().enumerate() {
            let values: Vec<f64> = column.iter().copied().collect();
            check_distribution(&values, &format!("emission column {}", j))?;
        }

        Ok(Self {
            initial,
            transmat,
            emission,
        })
    }

    /// Build a model started from its stationary distribution.
    pub fn with_stationary_start(
        transmat: DMatrix<f64>,
        emission: DMatrix<f64>,
    ) -> SpectralResult<Self> {
        let k = transmat.nrows();
        let uniform = DVector::from_element(k.max(1), 1.0 / k.max(1) as f64);
        let mut model = Self::new(uniform, transmat, emission)?;
        model.initial = model.stationary_distribution();
        Ok(model)
    }

    /// Number of hidden states `k`.
    pub fn num_states(&self) -> usize {
        self.transmat.nrows()
    }

    /// Number of observable symbols `D`.
    pub fn num_symbols(&self) -> usize {
        self.emission.nrows()
    }

    /// Initial state distribution.
    pub fn initial(&self) -> &DVector<f64> {
        &self.initial
    }

    /// Column-stochastic transition matrix.
    pub fn transmat(&self) -> &DMatrix<f64> {
        &self.transmat
    }

    /// `D x k` emission matrix.
    pub fn emission(&self) -> &DMatrix<f64> {
        &self.emission
    }

    /// Stationary distribution `pi = T pi`.
    ///
    /// Iterates the lazy chain `(I + T) / 2`, which shares its stationary
    /// distribution with `T` and converges for periodic chains too.
    pub fn stationary_distribution(&self) -> DVector<f64> {
        let k = self.num_states();
        let mut pi = DVector::from_element(k, 1.0 / k as f64);
        for _ in 0..STATIONARY_MAX_ITERATIONS {
            let next = (&pi + &self.transmat * &pi) * 0.5;
            let change = (&next - &pi).amax();
            pi = next;
            if change < STATIONARY_TOLERANCE {
                break;
            }
        }
        let total = pi.sum();
        pi / total
    }

    /// Sample `n` steps, returning `(hidden_states, symbols)`.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> (Vec<usize>, Vec<usize>) {
        let mut states = Vec::with_capacity(n);
        let mut symbols = Vec::with_capacity(n);
        if n == 0 {
            return (states, symbols);
        }

        let mut h = draw_categorical(self.initial.iter().copied(), rng);
        for t in 0..n {
            states.push(h);
            symbols.push(draw_categorical(self.emission.column(h).iter().copied(), rng));
            if t + 1 < n {
                h = draw_categorical(self.transmat.column(h).iter().copied(), rng);
            }
        }
        (states, symbols)
    }

    /// Sample `n` steps as an `n x D` one-hot observation matrix.
    pub fn sample_one_hot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
    ) -> SpectralResult<DMatrix<f64>> {
        let (_, symbols) = self.sample(n, rng);
        one_hot_encode(&symbols, self.num_symbols())
    }

    /// Exact `P31`, `P32`, `P312` of the stationary chain under one-hot encoding.
    ///
    /// With `O` the emission matrix, `T` the transition matrix and `pi` the
    /// stationary distribution:
    /// `P32 = O T diag(pi) O^T`, `P31 = (O T) W^T` and
    /// `P312[i, j, l] = sum_h (O T)[i, h] W[j, h] O[l, h]` where `W = O diag(pi) T^T`.
    pub fn population_moments(&self) -> EmpiricalMoments {
        let pi = self.stationary_distribution();
        let o = &self.emission;
        let d = self.num_symbols();
        let k = self.num_states();

        let diag_pi = DMatrix::from_diagonal(&pi);
        let m3 = o * &self.transmat;
        let w = o * &diag_pi * self.transmat.transpose();

        let p31 = &m3 * w.transpose();
        let p32 = &m3 * &diag_pi * o.transpose();
        let p312 = MomentTensor::from_fn(d, |i, j, l| {
            (0..k).map(|h| m3[(i, h)] * w[(j, h)] * o[(l, h)]).sum()
        });

        EmpiricalMoments { p31, p32, p312 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moments::compute_moments;
    use crate::secure_rng::SecureRng;
    use assert_approx_eq::assert_approx_eq;

    fn two_state_model() -> DiscreteHmm {
        DiscreteHmm::with_stationary_start(
            DMatrix::from_row_slice(2, 2, &[0.8, 0.3, 0.2, 0.7]),
            DMatrix::from_row_slice(3, 2, &[0.7, 0.1, 0.2, 0.2, 0.1, 0.7]),
        )
        .unwrap()
    }

    #[test]
    fn test_stationary_distribution() {
        let model = two_state_model();
        let pi = model.stationary_distribution();
        // Balance: 0.2 pi_0 = 0.3 pi_1
        assert_approx_eq!(pi[0], 0.6, 1e-10);
        assert_approx_eq!(pi[1], 0.4, 1e-10);
        assert!((model.transmat() * &pi - &pi).norm() < 1e-10);
    }

    #[test]
    fn test_periodic_chain_stationary() {
        let model = DiscreteHmm::with_stationary_start(
            DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
        )
        .unwrap();
        assert_approx_eq!(model.initial()[0], 0.5, 1e-10);
    }

    #[test]
    fn test_invalid_models_rejected() {
        let bad_transition = DiscreteHmm::new(
            DVector::from_vec(vec![0.5, 0.5]),
            DMatrix::from_row_slice(2, 2, &[0.9, 0.3, 0.2, 0.7]),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
        );
        assert!(matches!(
            bad_transition,
            Err(SpectralError::InvalidParameter { .. })
        ));

        let bad_shape = DiscreteHmm::new(
            DVector::from_vec(vec![1.0]),
            DMatrix::from_row_slice(2, 2, &[0.8, 0.3, 0.2, 0.7]),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
        );
        assert!(matches!(
            bad_shape,
            Err(SpectralError::DimensionMismatch { .. })
        ));

        let negative = DiscreteHmm::new(
            DVector::from_vec(vec![0.5, 0.5]),
            DMatrix::from_row_slice(2, 2, &[1.2, 0.3, -0.2, 0.7]),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]),
        );
        assert!(negative.is_err());
    }

    #[test]
    fn test_sampling_is_reproducible_and_in_range() {
        let model = two_state_model();
        let (states_a, symbols_a) = model.sample(500, &mut SecureRng::with_seed(3));
        let (states_b, symbols_b) = model.sample(500, &mut SecureRng::with_seed(3));
        assert_eq!(states_a, states_b);
        assert_eq!(symbols_a, symbols_b);
        assert!(states_a.iter().all(|&h| h < 2));
        assert!(symbols_a.iter().all(|&s| s < 3));

        let x = model.sample_one_hot(500, &mut SecureRng::with_seed(3)).unwrap();
        assert_eq!(x.shape(), (500, 3));
        assert!(x.row_iter().all(|row| (row.sum() - 1.0).abs() < 1e-15));
    }

    #[test]
    fn test_empirical_moments_approach_population() {
        let model = two_state_model();
        let x = model
            .sample_one_hot(200_000, &mut SecureRng::with_seed(11))
            .unwrap();
        let empirical = compute_moments(&x).unwrap();
        let population = model.population_moments();

        assert!((empirical.p31 - &population.p31).amax() < 0.01);
        assert!((empirical.p32 - &population.p32).amax() < 0.01);
        let tensor_error = empirical
            .p312
            .as_slice()
            .iter()
            .zip(population.p312.as_slice())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(tensor_error < 0.01);
    }

    #[test]
    fn test_population_moments_are_distributions() {
        let moments = two_state_model().population_moments();
        assert_approx_eq!(moments.p31.sum(), 1.0, 1e-12);
        assert_approx_eq!(moments.p32.sum(), 1.0, 1e-12);
        let total: f64 = moments.p312.as_slice().iter().sum();
        assert_approx_eq!(total, 1.0, 1e-12);
    }
}
