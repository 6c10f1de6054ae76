//! Cholesky based linear algebra used to get GP posterior and likelihood.
//!
//! The training covariance `K` is factorized as `K = L.L^t`, every product
//! involving `K^-1` is then computed with forward/backward substitutions.

use crate::errors::{GpError, Result};
use crate::utils::check_len;
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Cholesky factorization of a symmetric positive definite matrix
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub struct CholeskySolver<F: Float> {
    /// Lower triangular factor
    l: Array2<F>,
}

impl<F: Float> CholeskySolver<F> {
    /// Factorize `k` as `L.L^t`
    ///
    /// # Errors
    ///
    /// * [GpError::ShapeMismatch]: when `k` is not square
    /// * [GpError::NotPositiveDefinite]: when a leading minor of `k` is not positive
    pub fn factorize(k: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Self> {
        if k.nrows() != k.ncols() {
            return Err(GpError::ShapeMismatch(format!(
                "square matrix expected, got ({}, {})",
                k.nrows(),
                k.ncols()
            )));
        }
        let l = k
            .cholesky()
            .map_err(|e| GpError::NotPositiveDefinite(format!("Cholesky failure: {e}")))?;
        // NaN pivots do not always surface as factorization errors
        if l.diag().iter().any(|v| !(*v > F::zero()) || !v.is_finite()) {
            return Err(GpError::NotPositiveDefinite(
                "Cholesky failure: non positive pivot".to_string(),
            ));
        }
        Ok(CholeskySolver { l })
    }

    /// Lower triangular factor `L`
    pub fn lower(&self) -> &Array2<F> {
        &self.l
    }

    /// Size of the factorized matrix
    pub fn dim(&self) -> usize {
        self.l.nrows()
    }

    /// Forward substitution: solve `L.X = B`
    pub fn solve_lower(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        if b.nrows() != self.dim() {
            return Err(GpError::ShapeMismatch(format!(
                "right hand side should have {} rows, got {}",
                self.dim(),
                b.nrows()
            )));
        }
        Ok(self.l.solve_triangular(b, UPLO::Lower)?)
    }

    /// Solve `K.x = y` with forward then backward substitution
    pub fn solve(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let rhs = y.to_owned().insert_axis(Axis(1));
        let z = self.solve_lower(&rhs)?;
        let x = self.l.t().solve_triangular_into(z, UPLO::Upper)?;
        Ok(x.remove_axis(Axis(1)))
    }

    /// Natural logarithm of the determinant of `K`
    pub fn log_det(&self) -> F {
        // det(K) = prod(diag(L))^2
        self.l.diag().mapv(|v| v.ln()).sum() * F::cast(2.)
    }
}

/// Posterior mean `K*^t.alpha` given cross covariance `k_star` (n, m) and weights `alpha = K^-1.y` (n,)
pub fn posterior_mean<F: Float>(
    k_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
    alpha: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<Array1<F>> {
    check_len("alpha", alpha, k_star.nrows())?;
    Ok(k_star.t().dot(alpha))
}

/// Posterior variances `diag(K**) - sum_rows((L^-1.K*)^2)` (m,), clipped to be positive
pub fn posterior_variance<F: Float>(
    k_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
    k_star_star: &ArrayBase<impl Data<Elem = F>, Ix1>,
    solver: &CholeskySolver<F>,
) -> Result<Array1<F>> {
    check_len("prior variances", k_star_star, k_star.ncols())?;
    let v = solver.solve_lower(k_star)?;
    let var = k_star_star.to_owned() - v.mapv(|v| v * v).sum_axis(Axis(0));
    // Variance might be slightly negative depending on
    // machine precision: set to zero in that case
    Ok(var.mapv(|v| if v < F::zero() { F::zero() } else { v }))
}

/// Posterior covariance matrix `K** - (L^-1.K*)^t.(L^-1.K*)` (m, m), symmetrized
pub fn posterior_covariance<F: Float>(
    k_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
    k_star_star: &ArrayBase<impl Data<Elem = F>, Ix2>,
    solver: &CholeskySolver<F>,
) -> Result<Array2<F>> {
    if k_star_star.dim() != (k_star.ncols(), k_star.ncols()) {
        return Err(GpError::ShapeMismatch(format!(
            "prior covariance should be ({m}, {m}), got {:?}",
            k_star_star.dim(),
            m = k_star.ncols()
        )));
    }
    let v = solver.solve_lower(k_star)?;
    let cov = k_star_star.to_owned() - v.t().dot(&v);
    let half = F::cast(0.5);
    Ok((&cov + &cov.t()).mapv(|v| v * half))
}

/// Log marginal likelihood `-1/2 y^t.alpha - sum(log(diag(L))) - n/2 log(2 pi)`
pub fn log_marginal_likelihood<F: Float>(
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    alpha: &ArrayBase<impl Data<Elem = F>, Ix1>,
    solver: &CholeskySolver<F>,
) -> Result<F> {
    check_len("y", y, solver.dim())?;
    check_len("alpha", alpha, solver.dim())?;
    let half = F::cast(0.5);
    let n = F::cast(solver.dim());
    let two_pi = F::cast(2. * std::f64::consts::PI);
    Ok(-half * y.dot(alpha) - half * solver.log_det() - half * n * two_pi.ln())
}
