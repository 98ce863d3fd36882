//! Error types and validation functions for spectral HMM estimation.
//!
//! Every stage of the pipeline reports failures through [`SpectralError`].
//! Preconditions are checked before any computation starts; numerical
//! failures (singular inverses, non-converging decompositions) surface as
//! soon as they are detected.

use thiserror::Error;

/// Error types for spectral estimation operations.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SpectralError {
    /// Observation sequence is too short to form any lagged window.
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Minimum required observations
        required: usize,
        /// Actual number of observations provided
        actual: usize,
    },

    /// Invalid parameter value.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Matrix or vector shapes do not agree.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Where the mismatch was found
        context: String,
        /// Expected shape
        expected: String,
        /// Shape actually supplied
        actual: String,
    },

    /// Numerical computation error (non-finite values and similar).
    #[error("Numerical computation failed: {reason}")]
    NumericalError {
        /// Detailed reason for numerical failure
        reason: String,
        /// Operation that failed
        operation: Option<String>,
    },

    /// A required matrix inverse is singular or too ill-conditioned.
    #[error("Singular matrix in {operation}: condition number {condition_number:.3e}")]
    SingularMatrix {
        /// Operation requiring the inverse
        operation: String,
        /// Estimated 2-norm condition number (infinite when exactly singular)
        condition_number: f64,
    },

    /// The requested number of states exceeds the numerical rank of a moment matrix.
    #[error("Rank deficient in {operation}: requested rank {requested}, numerical rank {numerical_rank}")]
    RankDeficient {
        /// Operation that detected the deficiency
        operation: String,
        /// Rank requested by the caller
        requested: usize,
        /// Numerical rank found
        numerical_rank: usize,
    },

    /// A matrix decomposition failed to converge.
    #[error("{decomposition} decomposition failed in {operation}")]
    DecompositionFailed {
        /// Decomposition name
        decomposition: String,
        /// Operation that requested it
        operation: String,
    },

    /// A recovered transition column sums to (nearly) zero.
    #[error("Degenerate hidden state {state}: transition column sum {column_sum:.3e}")]
    DegenerateState {
        /// Index of the degenerate state
        state: usize,
        /// Raw column sum before normalization
        column_sum: f64,
    },

    /// Imaginary residual exceeded tolerance while strict checking is enabled.
    #[error("Imaginary residual {residual:.3e} in {matrix} exceeds tolerance {tolerance:.3e}")]
    ImaginaryResidual {
        /// Matrix carrying the residual
        matrix: String,
        /// Largest absolute imaginary part
        residual: f64,
        /// Configured tolerance
        tolerance: f64,
    },
}

/// Result type for spectral estimation operations.
pub type SpectralResult<T> = Result<T, SpectralError>;

/// Validates that an observation sequence is long enough for lagged moments.
///
/// # Example
/// ```rust
/// use spectral_hmm::errors::validate_sequence_length;
///
/// assert!(validate_sequence_length(3, 3).is_ok());
/// assert!(validate_sequence_length(2, 3).is_err());
/// ```
pub fn validate_sequence_length(actual: usize, min_required: usize) -> SpectralResult<()> {
    if actual < min_required {
        Err(SpectralError::InsufficientData {
            required: min_required,
            actual,
        })
    } else {
        Ok(())
    }
}

/// Validates the number of hidden states against the observation dimension.
///
/// `k` must satisfy `1 <= k <= dim`.
pub fn validate_num_states(k: usize, dim: usize) -> SpectralResult<()> {
    if k == 0 || k > dim {
        return Err(SpectralError::InvalidParameter {
            parameter: "num_states".to_string(),
            value: k as f64,
            constraint: format!("[1, {}]", dim),
        });
    }
    Ok(())
}

/// Validates that a parameter is within expected bounds (inclusive).
pub fn validate_parameter(value: f64, min: f64, max: f64, name: &str) -> SpectralResult<()> {
    if value.is_nan() {
        return Err(SpectralError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: "must not be NaN".to_string(),
        });
    }

    if value < min || value > max {
        Err(SpectralError::InvalidParameter {
            parameter: name.to_string(),
            value,
            constraint: format!("[{}, {}]", min, max),
        })
    } else {
        Ok(())
    }
}

/// Validates that all values in a slice are finite.
///
/// Returns on the first non-finite value, naming its index.
pub fn validate_all_finite(data: &[f64], name: &str) -> SpectralResult<()> {
    if let Some((i, &value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(SpectralError::NumericalError {
            reason: format!("{} contains non-finite value at index {}: {}", name, i, value),
            operation: None,
        });
    }
    Ok(())
}
