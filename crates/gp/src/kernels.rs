//! A module for stationary covariance functions (kernels) used to model
//! the correlation between function values of the GP model.
//!
//! Every kernel is parameterized by a single isotropic `length_scale` (l > 0)
//! and depends only on the euclidean distance `r = |x - x'| / l`.
//!
//! The following kernels are implemented:
//! * squared exponential (RBF): `exp(-r^2 / 2)`,
//! * absolute exponential: `exp(-r)`,
//! * matern 3/2: `(1 + sqrt(3) r) exp(-sqrt(3) r)`,
//! * matern 5/2: `(1 + sqrt(5) r + 5/3 r^2) exp(-sqrt(5) r)`.

use crate::errors::{GpError, Result};
use crate::utils::{check_same_dims, pairwise_differences};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Check a length scale is usable to evaluate a kernel
pub fn check_length_scale<F: Float>(length_scale: F) -> Result<()> {
    if !(length_scale > F::zero()) || !length_scale.is_finite() {
        return Err(GpError::InvalidParameter(format!(
            "length scale should be strictly positive and finite, got {length_scale}"
        )));
    }
    Ok(())
}

/// A trait for using a covariance function in GP regression
pub trait Kernel<F: Float>: Clone + Copy + Default + fmt::Display + Sync {
    /// Compute kernel values given `d` differences (n, nx) between points x and x'
    /// and the `length_scale` parameter. Returns n values.
    ///
    /// The length scale is not checked, use [`Kernel::evaluate_matrix`] for a checked version.
    fn value(&self, d: &ArrayBase<impl Data<Elem = F>, Ix2>, length_scale: F) -> Array1<F>;

    /// Covariance between two points `xa` and `xb`
    fn evaluate(
        &self,
        xa: &ArrayBase<impl Data<Elem = F>, Ix1>,
        xb: &ArrayBase<impl Data<Elem = F>, Ix1>,
        length_scale: F,
    ) -> Result<F> {
        check_length_scale(length_scale)?;
        if xa.len() != xb.len() {
            return Err(GpError::ShapeMismatch(format!(
                "points dimension mismatch: {} vs {}",
                xa.len(),
                xb.len()
            )));
        }
        let d = (xa - xb).insert_axis(ndarray::Axis(0));
        Ok(self.value(&d, length_scale)[0])
    }

    /// Covariance matrix (n1, n2) between each row of `x1` (n1, nx) and each row of `x2` (n2, nx)
    fn evaluate_matrix(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        length_scale: F,
    ) -> Result<Array2<F>> {
        check_length_scale(length_scale)?;
        check_same_dims(x1, x2)?;
        let d = pairwise_differences(x1, x2);
        let k = self.value(&d, length_scale);
        k.into_shape((x1.nrows(), x2.nrows()))
            .map_err(|e| GpError::ShapeMismatch(e.to_string()))
    }
}

/// Scaled distances `|d_i| / l` for each row of `d`
fn scaled_distances<F: Float>(
    d: &ArrayBase<impl Data<Elem = F>, Ix2>,
    length_scale: F,
) -> Array1<F> {
    d.rows()
        .into_iter()
        .map(|row| row.dot(&row).sqrt() / length_scale)
        .collect()
}

macro_rules! kernel_name {
    ($kernel:ident, $name:literal) => {
        impl From<$kernel> for String {
            fn from(_item: $kernel) -> String {
                $name.to_string()
            }
        }

        impl TryFrom<String> for $kernel {
            type Error = &'static str;
            fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
                if s == $name {
                    Ok(Self::default())
                } else {
                    Err(concat!(
                        "Bad string value for ",
                        stringify!($kernel),
                        ", should be \'",
                        $name,
                        "\'"
                    ))
                }
            }
        }

        impl fmt::Display for $kernel {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, $name)
            }
        }
    };
}

/// Squared exponential (aka RBF) kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct SquaredExponentialKernel();

kernel_name!(SquaredExponentialKernel, "SquaredExponential");

impl<F: Float> Kernel<F> for SquaredExponentialKernel {
    /// exp( - |d|^2 / (2 * l^2) )
    fn value(&self, d: &ArrayBase<impl Data<Elem = F>, Ix2>, length_scale: F) -> Array1<F> {
        let two_l2 = F::cast(2.) * length_scale * length_scale;
        d.rows()
            .into_iter()
            .map(|row| F::exp(-row.dot(&row) / two_l2))
            .collect()
    }
}

/// Absolute exponential kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct AbsoluteExponentialKernel();

kernel_name!(AbsoluteExponentialKernel, "AbsoluteExponential");

impl<F: Float> Kernel<F> for AbsoluteExponentialKernel {
    /// exp( - |d| / l )
    fn value(&self, d: &ArrayBase<impl Data<Elem = F>, Ix2>, length_scale: F) -> Array1<F> {
        scaled_distances(d, length_scale).mapv(|r| F::exp(-r))
    }
}

/// Matern 3/2 kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct Matern32Kernel();

kernel_name!(Matern32Kernel, "Matern32");

impl<F: Float> Kernel<F> for Matern32Kernel {
    /// (1 + sqrt(3) |d| / l) exp( - sqrt(3) |d| / l )
    fn value(&self, d: &ArrayBase<impl Data<Elem = F>, Ix2>, length_scale: F) -> Array1<F> {
        let sqrt3 = F::cast(3.).sqrt();
        scaled_distances(d, length_scale)
            .mapv(|r| (F::one() + sqrt3 * r) * F::exp(-sqrt3 * r))
    }
}

/// Matern 5/2 kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(into = "String"),
    serde(try_from = "String")
)]
pub struct Matern52Kernel();

kernel_name!(Matern52Kernel, "Matern52");

impl<F: Float> Kernel<F> for Matern52Kernel {
    /// (1 + sqrt(5) |d| / l + 5/3 (|d| / l)^2) exp( - sqrt(5) |d| / l )
    fn value(&self, d: &ArrayBase<impl Data<Elem = F>, Ix2>, length_scale: F) -> Array1<F> {
        let sqrt5 = F::cast(5.).sqrt();
        let five_third = F::cast(5. / 3.);
        scaled_distances(d, length_scale)
            .mapv(|r| (F::one() + sqrt5 * r + five_third * r * r) * F::exp(-sqrt5 * r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use paste::paste;

    #[test]
    fn test_squared_exponential_value() {
        let k = SquaredExponentialKernel::default();
        let v = k
            .evaluate(&array![0., 0.], &array![1., 1.], 2.)
            .expect("valid kernel evaluation");
        // |d|^2 = 2, 2 l^2 = 8
        assert_abs_diff_eq!(f64::exp(-0.25), v, epsilon = 1e-12);
    }

    #[test]
    fn test_matern_values() {
        let d = array![[1.]];
        let m32: Array1<f64> = Matern32Kernel::default().value(&d, 1.);
        let m52: Array1<f64> = Matern52Kernel::default().value(&d, 1.);
        let abs: Array1<f64> = AbsoluteExponentialKernel::default().value(&d, 1.);
        let s3 = 3f64.sqrt();
        let s5 = 5f64.sqrt();
        assert_abs_diff_eq!((1. + s3) * (-s3).exp(), m32[0], epsilon = 1e-12);
        assert_abs_diff_eq!((1. + s5 + 5. / 3.) * (-s5).exp(), m52[0], epsilon = 1e-12);
        assert_abs_diff_eq!((-1f64).exp(), abs[0], epsilon = 1e-12);
    }

    #[test]
    fn test_bad_length_scale() {
        let k = SquaredExponentialKernel::default();
        for ls in [0., -1., f64::NAN, f64::INFINITY] {
            assert!(matches!(
                k.evaluate(&array![0.], &array![1.], ls),
                Err(GpError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let k = SquaredExponentialKernel::default();
        assert!(matches!(
            k.evaluate_matrix(&array![[0., 1.]], &array![[1.]], 1.),
            Err(GpError::ShapeMismatch(_))
        ));
    }

    macro_rules! test_kernel {
        ($kernel:ident) => {
            paste! {

                #[test]
                fn [<test_ $kernel:snake _self_similarity>]() {
                    let k = [<$kernel Kernel>]::default();
                    let x = array![3.5, -1.2];
                    for ls in [1e-3, 0.1, 1., 42., 1e4] {
                        assert_eq!(1.0, k.evaluate(&x, &x, ls).unwrap());
                    }
                }

                #[test]
                fn [<test_ $kernel:snake _symmetric_matrix>]() {
                    let k = [<$kernel Kernel>]::default();
                    let x = Array::linspace(0., 5., 7).insert_axis(ndarray::Axis(1));
                    let kxx = k.evaluate_matrix(&x, &x, 0.7).unwrap();
                    assert_eq!((7, 7), kxx.dim());
                    assert_abs_diff_eq!(kxx, kxx.t(), epsilon = 1e-15);
                    assert_abs_diff_eq!(kxx.diag(), Array1::<f64>::ones(7), epsilon = 1e-15);
                }

                #[test]
                fn [<test_ $kernel:snake _decreasing_with_distance>]() {
                    let k = [<$kernel Kernel>]::default();
                    let x0 = array![[0.]];
                    let xs = array![[0.1], [0.5], [1.], [2.]];
                    let v = k.evaluate_matrix(&x0, &xs, 1.).unwrap();
                    for j in 1..xs.nrows() {
                        assert!(v[[0, j]] < v[[0, j - 1]]);
                    }
                }

                #[test]
                fn [<test_ $kernel:snake _name_roundtrip>]() {
                    let name: String = [<$kernel Kernel>]::default().into();
                    assert_eq!(name, [<$kernel Kernel>]::default().to_string());
                    assert!([<$kernel Kernel>]::try_from(name).is_ok());
                    assert!([<$kernel Kernel>]::try_from("Foo".to_string()).is_err());
                }
            }
        };
    }

    test_kernel!(SquaredExponential);
    test_kernel!(AbsoluteExponential);
    test_kernel!(Matern32);
    test_kernel!(Matern52);
}
