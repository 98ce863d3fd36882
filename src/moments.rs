//! Empirical second- and third-order moments of an observation sequence.
//!
//! Observations are the rows of an `N x D` matrix. With `x_t` the `t`-th row:
//!
//! - `P31  = mean_t x_{t+2} (x) x_t`,           `t = 0..N-3`
//! - `P32  = mean_t x_{t+1} (x) x_t`,           `t = 1..N-2`
//! - `P312 = mean_t x_{t+2} (x) x_t (x) x_{t+1}`, `t = 0..N-3`
//!
//! Each average is an explicit multiply-accumulate over the dense rows
//! followed by a division by the window count.

use crate::errors::{validate_all_finite, validate_sequence_length, SpectralError, SpectralResult};
use nalgebra::{DMatrix, DVector};

/// Shortest sequence with at least one valid lag-2 window.
pub const MIN_SEQUENCE_LENGTH: usize = 3;

/// Dense `D x D x D` tensor stored row-major as `[i][j][l]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentTensor {
    dim: usize,
    data: Vec<f64>,
}

impl MomentTensor {
    /// Zero tensor of side `dim`.
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; dim * dim * dim],
        }
    }

    /// Tensor with entry `[i, j, l]` set to `f(i, j, l)`.
    pub fn from_fn<F: FnMut(usize, usize, usize) -> f64>(dim: usize, mut f: F) -> Self {
        let mut data = Vec::with_capacity(dim * dim * dim);
        for i in 0..dim {
            for j in 0..dim {
                for l in 0..dim {
                    data.push(f(i, j, l));
                }
            }
        }
        Self { dim, data }
    }

    /// Side length `D`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    fn index(&self, i: usize, j: usize, l: usize) -> usize {
        (i * self.dim + j) * self.dim + l
    }

    /// Entry `[i, j, l]`.
    pub fn get(&self, i: usize, j: usize, l: usize) -> f64 {
        self.data[self.index(i, j, l)]
    }

    /// Contract the last axis with `eta`: `out[i, j] = sum_l T[i, j, l] * eta[l]`.
    pub fn contract_last(&self, eta: &DVector<f64>) -> SpectralResult<DMatrix<f64>> {
        if eta.len() != self.dim {
            return Err(SpectralError::DimensionMismatch {
                context: "MomentTensor::contract_last".to_string(),
                expected: format!("vector of length {}", self.dim),
                actual: format!("length {}", eta.len()),
            });
        }

        let d = self.dim;
        let mut out = DMatrix::<f64>::zeros(d, d);
        for i in 0..d {
            for j in 0..d {
                let base = self.index(i, j, 0);
                let fiber = &self.data[base..base + d];
                out[(i, j)] = fiber.iter().zip(eta.iter()).map(|(t, e)| t * e).sum();
            }
        }
        Ok(out)
    }

    /// Raw row-major storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// The three moment estimates consumed by the spectral pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EmpiricalMoments {
    /// `E[x_{t+2} (x) x_t]`
    pub p31: DMatrix<f64>,
    /// `E[x_{t+1} (x) x_t]`
    pub p32: DMatrix<f64>,
    /// `E[x_{t+2} (x) x_t (x) x_{t+1}]`
    pub p312: MomentTensor,
}

fn validate_observations(x: &DMatrix<f64>) -> SpectralResult<()> {
    validate_sequence_length(x.nrows(), MIN_SEQUENCE_LENGTH)?;
    if x.ncols() == 0 {
        return Err(SpectralError::InvalidParameter {
            parameter: "observation_dim".to_string(),
            value: 0.0,
            constraint: ">= 1".to_string(),
        });
    }
    validate_all_finite(x.as_slice(), "observations")
}

fn lagged_second_moment(x: &DMatrix<f64>, lag: usize, start: usize) -> DMatrix<f64> {
    let (n, d) = x.shape();
    let mut acc = DMatrix::<f64>::zeros(d, d);
    let windows = start..(n - lag);
    let count = windows.len();

    for t in windows {
        for j in 0..d {
            let xj = x[(t, j)];
            if xj == 0.0 {
                continue;
            }
            for i in 0..d {
                acc[(i, j)] += x[(t + lag, i)] * xj;
            }
        }
    }

    acc / count as f64
}

/// `P31[i, j] = mean over t in [0, N-3] of x_{t+2}[i] * x_t[j]`.
pub fn make_p31(x: &DMatrix<f64>) -> SpectralResult<DMatrix<f64>> {
    validate_observations(x)?;
    Ok(lagged_second_moment(x, 2, 0))
}

/// `P32[i, j] = mean over t in [1, N-2] of x_{t+1}[i] * x_t[j]`.
///
/// The window starts at index 1, aligned with the middle view of `P312`.
pub fn make_p32(x: &DMatrix<f64>) -> SpectralResult<DMatrix<f64>> {
    validate_observations(x)?;
    Ok(lagged_second_moment(x, 1, 1))
}

/// `P312[i, j, l] = mean over t in [0, N-3] of x_{t+2}[i] * x_t[j] * x_{t+1}[l]`.
pub fn make_p312(x: &DMatrix<f64>) -> SpectralResult<MomentTensor> {
    validate_observations(x)?;

    let (n, d) = x.shape();
    let mut tensor = MomentTensor::zeros(d);
    let count = n - 2;

    for t in 0..count {
        for i in 0..d {
            let a = x[(t + 2, i)];
            if a == 0.0 {
                continue;
            }
            for j in 0..d {
                let ab = a * x[(t, j)];
                if ab == 0.0 {
                    continue;
                }
                let base = tensor.index(i, j, 0);
                for l in 0..d {
                    tensor.data[base + l] += ab * x[(t + 1, l)];
                }
            }
        }
    }

    let scale = 1.0 / count as f64;
    tensor.data.iter_mut().for_each(|v| *v *= scale);
    Ok(tensor)
}

/// Compute `P31`, `P32` and `P312` in one call.
pub fn compute_moments(x: &DMatrix<f64>) -> SpectralResult<EmpiricalMoments> {
    let p31 = make_p31(x)?;
    let p32 = make_p32(x)?;
    let p312 = make_p312(x)?;
    log::debug!(
        "Computed moments for {} observations of dimension {}",
        x.nrows(),
        x.ncols()
    );
    Ok(EmpiricalMoments { p31, p32, p312 })
}

/// Basis (one-hot) encoding of a discrete symbol sequence as an `N x D` matrix.
pub fn one_hot_encode(symbols: &[usize], num_symbols: usize) -> SpectralResult<DMatrix<f64>> {
    if num_symbols == 0 {
        return Err(SpectralError::InvalidParameter {
            parameter: "num_symbols".to_string(),
            value: 0.0,
            constraint: ">= 1".to_string(),
        });
    }

    let mut x = DMatrix::<f64>::zeros(symbols.len(), num_symbols);
    for (t, &s) in symbols.iter().enumerate() {
        if s >= num_symbols {
            return Err(SpectralError::InvalidParameter {
                parameter: format!("symbols[{}]", t),
                value: s as f64,
                constraint: format!("[0, {})", num_symbols),
            });
        }
        x[(t, s)] = 1.0;
    }
    Ok(x)
}
