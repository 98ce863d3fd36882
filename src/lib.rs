//! # Spectral HMM Estimation
//!
//! Method-of-moments estimation of discrete hidden Markov models
//! (Anandkumar, Hsu & Kakade, 2012, Algorithm B).
//!
//! Given an observation sequence, the estimator forms empirical second- and
//! third-order moments, projects them onto their leading singular subspaces,
//! jointly diagonalizes a randomly rotated family of whitened slices, and reads
//! off the emission and transition matrices in closed form. There is no EM
//! loop and no likelihood evaluation: one call, one estimate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nalgebra::DMatrix;
//! use spectral_hmm::{DiscreteHmm, SecureRng, SpectralEstimator, SpectralConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = DiscreteHmm::with_stationary_start(
//!         DMatrix::from_row_slice(2, 2, &[0.8, 0.3, 0.2, 0.7]),
//!         DMatrix::from_row_slice(3, 2, &[0.7, 0.1, 0.2, 0.2, 0.1, 0.7]),
//!     )?;
//!
//!     let mut rng = SecureRng::with_seed(7);
//!     let x = model.sample_one_hot(100_000, &mut rng)?;
//!
//!     let estimator = SpectralEstimator::new(SpectralConfig::default());
//!     let estimate = estimator.estimate(&x, 2, &mut rng)?;
//!
//!     println!("emission:\n{}", estimate.emission_probs);
//!     println!("transition:\n{}", estimate.transmat);
//!     println!("eigengap: {:.3e}", estimate.diagnostics.min_eigengap);
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! 1. [`moments`]: `P31`, `P32`, `P312` from lagged outer products
//! 2. [`subspace`]: top-`k` singular vectors `U1`, `U2`, `U3`
//! 3. [`diagonalization`]: random rotation, `B312` family, eigenvectors `R3` and diagonals `L`
//! 4. [`recovery`]: `emission_probs = Re(U2 theta^{-1} L)`, column-normalized transitions
//!
//! Randomness is always injected: every function that samples takes a
//! `&mut impl rand::Rng`, so seeded generators give reproducible estimates.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod linear_algebra;
pub mod secure_rng;

// Estimation pipeline
pub mod diagonalization;
pub mod estimator;
pub mod moments;
pub mod recovery;
pub mod subspace;

// Synthetic data and validation
pub mod evaluation;
pub mod generators;

// Re-exports for convenience - main public API
pub use config::SpectralConfig;
pub use errors::{SpectralError, SpectralResult};
pub use estimator::{estimate, EstimationDiagnostics, SpectralEstimate, SpectralEstimator};
pub use secure_rng::SecureRng;

pub use diagonalization::{form_b312, form_l, sample_rotation_matrix, JointDiagonalization};
pub use moments::{
    compute_moments, make_p31, make_p312, make_p32, one_hot_encode, EmpiricalMoments,
    MomentTensor,
};
pub use recovery::{normalize_columns, recover_parameters, RecoveredParameters};
pub use subspace::{extract_subspaces, SubspaceBases};

pub use evaluation::{match_states, max_abs_difference, permute_emission, permute_transition};
pub use generators::DiscreteHmm;
