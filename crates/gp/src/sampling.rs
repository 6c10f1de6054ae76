//! Draws from a multivariate gaussian distribution `N(mean, cov)`.
//!
//! Each sample is `mean + C.z` where `z` are independent standard normal draws
//! and `C` a square root of `cov` (`C.C^t = cov`), computed either by
//! Cholesky factorization or by eigen-decomposition.

use crate::errors::{GpError, Result};
use crate::solver::CholeskySolver;
use linfa::Float;
use linfa_linalg::eigh::*;
use ndarray::{Array, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Relative tolerance on negative eigenvalues of a covariance matrix
pub const EIGEN_TOLERANCE: f64 = 1e-8;

/// Covariance matrix square root computation method
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum SamplingMethod {
    /// Cholesky factorization, fails when the covariance is singular
    Cholesky,
    /// Eigen-decomposition with small negative eigenvalues clipped to zero
    #[default]
    EigenValues,
}

/// Draw `n_samples` vectors from `N(mean, cov)` with a generator seeded by `seed`.
/// Returns a (n_samples, m) matrix, one sample per row.
///
/// # Errors
///
/// * [GpError::ShapeMismatch]: when `cov` is not (m, m)
/// * [GpError::InvalidCovariance]: when `cov` has an eigenvalue below `-EIGEN_TOLERANCE * max(1, max|eigenvalue|)`
/// * [GpError::NotPositiveDefinite]: when Cholesky method is used on a non positive definite `cov`
pub fn sample<F: Float>(
    mean: &ArrayBase<impl Data<Elem = F>, Ix1>,
    cov: &ArrayBase<impl Data<Elem = F>, Ix2>,
    n_samples: usize,
    seed: u64,
    method: SamplingMethod,
) -> Result<Array2<F>> {
    let m = mean.len();
    if cov.dim() != (m, m) {
        return Err(GpError::ShapeMismatch(format!(
            "covariance should be ({m}, {m}), got {:?}",
            cov.dim()
        )));
    }
    if m == 0 {
        return Ok(Array2::zeros((n_samples, 0)));
    }
    let c = covariance_sqrt(cov, method)?;

    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    let z = Array::random_using((m, n_samples), StandardNormal, &mut rng)
        .mapv(|v: f64| F::cast(v));
    let draws = c.dot(&z) + &mean.view().insert_axis(Axis(1));
    Ok(draws.reversed_axes())
}

/// Matrix `C` such that `C.C^t = cov`
fn covariance_sqrt<F: Float>(
    cov: &ArrayBase<impl Data<Elem = F>, Ix2>,
    method: SamplingMethod,
) -> Result<Array2<F>> {
    match method {
        SamplingMethod::Cholesky => Ok(CholeskySolver::factorize(cov)?.lower().to_owned()),
        SamplingMethod::EigenValues => {
            let (values, vectors) = cov.to_owned().eigh_into()?;
            let max_abs = values
                .mapv(num_traits::float::Float::abs)
                .max()
                .map(|v| *v)
                .unwrap_or_else(|_| F::zero());
            let eps = F::cast(EIGEN_TOLERANCE) * F::max(F::one(), max_abs);
            if let Some(v) = values.iter().find(|v| **v < -eps) {
                return Err(GpError::InvalidCovariance(format!(
                    "eigenvalue {v} is below tolerance -{eps}"
                )));
            }
            // Clip round-off negative values
            let sqrt_values = values.mapv(|v| if v > F::zero() { v.sqrt() } else { F::zero() });
            Ok(&vectors * &sqrt_values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use paste::paste;

    fn mean_cov() -> (ndarray::Array1<f64>, Array2<f64>) {
        (array![1., -2.], array![[2., 0.5], [0.5, 1.]])
    }

    macro_rules! test_sampling {
        ($method:ident) => {
            paste! {

                #[test]
                fn [<test_sample_ $method:snake _shape_and_determinism>]() {
                    let (mean, cov) = mean_cov();
                    let s1 = sample(&mean, &cov, 5, 42, SamplingMethod::$method).unwrap();
                    let s2 = sample(&mean, &cov, 5, 42, SamplingMethod::$method).unwrap();
                    let s3 = sample(&mean, &cov, 5, 43, SamplingMethod::$method).unwrap();
                    assert_eq!((5, 2), s1.dim());
                    assert_eq!(s1, s2);
                    assert_ne!(s1, s3);
                }

                #[test]
                fn [<test_sample_ $method:snake _statistics>]() {
                    let (mean, cov) = mean_cov();
                    let n = 10_000;
                    let s = sample(&mean, &cov, n, 0, SamplingMethod::$method).unwrap();
                    let emp_mean = s.mean_axis(Axis(0)).unwrap();
                    assert_abs_diff_eq!(mean, emp_mean, epsilon = 0.06);
                    let centered = &s - &emp_mean;
                    let emp_cov = centered.t().dot(&centered) / (n as f64 - 1.);
                    assert_abs_diff_eq!(cov, emp_cov, epsilon = 0.12);
                }
            }
        };
    }

    test_sampling!(Cholesky);
    test_sampling!(EigenValues);

    #[test]
    fn test_singular_covariance() {
        // rank one covariance: every sample lies on the line y = x
        let mean = array![0., 0.];
        let cov = array![[1., 1.], [1., 1.]];
        let s = sample(&mean, &cov, 50, 0, SamplingMethod::EigenValues).unwrap();
        assert_abs_diff_eq!(s.column(0), s.column(1), epsilon = 1e-6);

        // slightly negative eigenvalue from round-off
        let cov = array![[1., 1. + 1e-12], [1. + 1e-12, 1.]];
        assert!(sample(&mean, &cov, 2, 0, SamplingMethod::EigenValues).is_ok());
        assert!(matches!(
            sample(&mean, &cov, 2, 0, SamplingMethod::Cholesky),
            Err(GpError::NotPositiveDefinite(_))
        ));
    }

    #[test]
    fn test_zero_covariance() {
        let mean = array![3., 4., 5.];
        let cov = Array2::zeros((3, 3));
        let s = sample(&mean, &cov, 4, 0, SamplingMethod::default()).unwrap();
        for row in s.rows() {
            assert_abs_diff_eq!(mean, row, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_invalid_covariance() {
        let mean = array![0., 0.];
        let cov = array![[1., 0.], [0., -0.5]];
        assert!(matches!(
            sample(&mean, &cov, 3, 0, SamplingMethod::EigenValues),
            Err(GpError::InvalidCovariance(_))
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let (_, cov) = mean_cov();
        assert!(matches!(
            sample(&array![0., 0., 0.], &cov, 3, 0, SamplingMethod::EigenValues),
            Err(GpError::ShapeMismatch(_))
        ));
    }
}
