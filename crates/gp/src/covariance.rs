//! Covariance matrices construction: training covariance with its diagonal
//! noise term (aka nugget), training/query cross covariance and query covariance.

use crate::errors::{GpError, Result};
use crate::kernels::{check_length_scale, Kernel};
use crate::utils::{check_len, DiffMatrix};
use linfa::Float;
use log::warn;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};

/// Jitter added to the training covariance diagonal, relative to the kernel variance,
/// when no noise at all is specified.
pub const MIN_JITTER: f64 = 1e-10;

/// Training covariance matrix builder.
///
/// Pairwise differences between training points are computed once, the matrix
/// is then rebuilt from scratch for each requested length scale.
#[derive(Debug, Clone)]
pub struct CovarianceBuilder<F: Float> {
    diffs: DiffMatrix<F>,
    nx: usize,
    noise: Array1<F>,
    noise_free: bool,
}

impl<F: Float> CovarianceBuilder<F> {
    /// Constructor given training points `x` (n, nx) and `noise` variances (n,)
    /// to be added to the covariance diagonal.
    pub fn new(
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        check_len("noise variances", noise, x.nrows())?;
        if noise.iter().any(|v| !(*v >= F::zero()) || !v.is_finite()) {
            return Err(GpError::InvalidParameter(
                "noise variances should be positive or zero and finite".to_string(),
            ));
        }
        let diffs = DiffMatrix::new(x);
        if diffs.sq_norms().iter().any(|v| *v == F::zero()) {
            warn!("Multiple training points share the same location (at least same row twice)");
        }
        let noise_free = noise.iter().all(|v| *v == F::zero());
        Ok(CovarianceBuilder {
            diffs,
            nx: x.ncols(),
            noise: noise.to_owned(),
            noise_free,
        })
    }

    /// Number of training points
    pub fn n_obs(&self) -> usize {
        self.diffs.n_obs
    }

    /// Noise variances added to the diagonal
    pub fn noise(&self) -> &Array1<F> {
        &self.noise
    }

    /// Builder with `jitter` added to every noise variance
    pub fn with_extra_jitter(&self, jitter: F) -> Self {
        let noise = self.noise.mapv(|v| v + jitter);
        let noise_free = noise.iter().all(|v| *v == F::zero());
        CovarianceBuilder {
            diffs: self.diffs.clone(),
            nx: self.nx,
            noise,
            noise_free,
        }
    }

    /// Training covariance `K = k(X, X) + diag(noise)` for the given `length_scale`.
    /// When all noise variances are zero, [MIN_JITTER] times the kernel variance is used instead.
    pub fn build<K: Kernel<F>>(&self, kernel: &K, length_scale: F) -> Result<Array2<F>> {
        check_length_scale(length_scale)?;
        let variance = kernel.value(&Array2::<F>::zeros((1, self.nx)), length_scale)[0];
        let n_obs = self.diffs.n_obs;

        let mut k = Array2::<F>::eye(n_obs).mapv(|v| v * variance);
        if self.noise_free {
            let jitter = F::cast(MIN_JITTER) * variance;
            k.diag_mut().mapv_inplace(|v| v + jitter);
        } else {
            k.diag_mut().zip_mut_with(&self.noise, |v, noise| *v += *noise);
        }

        let kij = kernel.value(&self.diffs.d, length_scale);
        for (i, ij) in self.diffs.d_indices.outer_iter().enumerate() {
            k[[ij[0], ij[1]]] = kij[i];
            k[[ij[1], ij[0]]] = kij[i];
        }
        Ok(k)
    }
}

/// Training covariance matrix (n, n) given training points `x` (n, nx) and `noise` variances (n,)
pub fn training_covariance<F: Float, K: Kernel<F>>(
    kernel: &K,
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    length_scale: F,
    noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<Array2<F>> {
    CovarianceBuilder::new(x, noise)?.build(kernel, length_scale)
}

/// Cross covariance matrix (n, m) between training points `xtrain` (n, nx) and query points `xquery` (m, nx)
pub fn cross_covariance<F: Float, K: Kernel<F>>(
    kernel: &K,
    xtrain: &ArrayBase<impl Data<Elem = F>, Ix2>,
    xquery: &ArrayBase<impl Data<Elem = F>, Ix2>,
    length_scale: F,
) -> Result<Array2<F>> {
    kernel.evaluate_matrix(xtrain, xquery, length_scale)
}

/// Prior covariance matrix (m, m) at query points `xquery` (m, nx)
pub fn query_covariance<F: Float, K: Kernel<F>>(
    kernel: &K,
    xquery: &ArrayBase<impl Data<Elem = F>, Ix2>,
    length_scale: F,
) -> Result<Array2<F>> {
    kernel.evaluate_matrix(xquery, xquery, length_scale)
}

/// Prior variances (m,) at query points `xquery` (m, nx), i.e. the diagonal of [query_covariance]
pub fn query_variance<F: Float, K: Kernel<F>>(
    kernel: &K,
    xquery: &ArrayBase<impl Data<Elem = F>, Ix2>,
    length_scale: F,
) -> Result<Array1<F>> {
    check_length_scale(length_scale)?;
    Ok(kernel.value(&Array2::<F>::zeros(xquery.dim()), length_scale))
}
