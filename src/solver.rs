//! Confidence-weighted ridge solve for a user's preference vector.
//!
//! With binary implicit labels `p_i = [i ∈ S]` and confidence
//! `1 + c·[i ∈ S]`, minimizing
//! `Σ_i (1 + c·[i∈S]) (p_i − u·x_i)² + λ‖u‖²` leads to the F×F system
//!
//! ```text
//! (G + c·Σ_{i∈S} x_i x_iᵗ + λI) u = c·Σ_{i∈S} x_i
//! ```
//!
//! `G = XᵗX` is shared and precomputed by the store, so each call only pays
//! `O(|S|·F²)` for the correction and `O(F³)` for one Cholesky factorization.

use faer::linalg::solvers::Solve;
use faer::{MatMut, MatRef, Side};
use thiserror::Error;

use crate::config::ConfigError;
use crate::kernels::axpy;
use crate::models::FeedbackSet;
use crate::store::FactorStore;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolveError {
    #[error("preference system is not positive definite")]
    NotPositiveDefinite,
}

/// Validated solver hyperparameters: confidence `c > 0` and
/// regularization `λ > 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    confidence: f64,
    regularization: f64,
}

impl ModelParams {
    pub fn new(confidence: f64, regularization: f64) -> Result<Self, ConfigError> {
        if !(confidence.is_finite() && confidence > 0.0) {
            return Err(ConfigError::InvalidConfidence(confidence));
        }
        if !(regularization.is_finite() && regularization > 0.0) {
            return Err(ConfigError::InvalidRegularization(regularization));
        }
        Ok(Self {
            confidence,
            regularization,
        })
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn regularization(&self) -> f64 {
        self.regularization
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            confidence: 3.0,
            regularization: 0.001,
        }
    }
}

/// Computes preference vectors against a [`FactorStore`].
#[derive(Debug, Clone, Copy)]
pub struct ImplicitSolver {
    params: ModelParams,
}

impl ImplicitSolver {
    pub fn new(params: ModelParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> ModelParams {
        self.params
    }

    /// Solves for the preference vector of `feedback`.
    ///
    /// An empty feedback set has a zero right-hand side, so the answer is the
    /// zero vector and no factorization is done. Every index in `feedback`
    /// must be valid for `store`.
    pub fn solve(&self, store: &FactorStore, feedback: &FeedbackSet) -> Result<Vec<f64>, SolveError> {
        let k = store.dimension();
        if feedback.is_empty() {
            return Ok(vec![0.0; k]);
        }

        let c = self.params.confidence;
        let mut a = store.gram().to_vec();
        let mut b = vec![0.0f64; k];

        for j in 0..k {
            a[j * k + j] += self.params.regularization;
        }

        for index in feedback.iter() {
            let x = store.vector(index);
            axpy(c, x, &mut b);
            for r in 0..k {
                axpy(c * x[r], x, &mut a[r * k..(r + 1) * k]);
            }
        }

        cholesky_solve_inplace(&a, &mut b, k)?;
        Ok(b)
    }
}

/// Solves `A x = b` for symmetric positive definite row-major `a`, writing `x`
/// into `b`.
fn cholesky_solve_inplace(a: &[f64], b: &mut [f64], k: usize) -> Result<(), SolveError> {
    let a_mat = MatRef::from_row_major_slice(a, k, k);
    let mut b_mat = MatMut::from_column_major_slice_mut(b, k, 1);

    let llt = a_mat
        .llt(Side::Lower)
        .map_err(|_| SolveError::NotPositiveDefinite)?;
    let x = llt.solve(b_mat.as_ref());
    b_mat.copy_from(x.as_ref());
    Ok(())
}
