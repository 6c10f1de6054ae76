//! Affine rescaling of observations to zero mean and unit variance.
//!
//! Kernels and likelihood optimization behave well only near unit scale,
//! so targets `y` and their uncertainties `sigma` are rescaled before fitting
//! and predictions are mapped back afterwards with the very same [`Rescaler`].

use crate::errors::{GpError, Result};
use crate::utils::check_len;
use linfa::Float;
use ndarray::{Array, Array1, ArrayBase, Axis, Data, Dimension, Ix1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Mean and standard deviation of training targets.
///
/// The standard deviation is the *sample* one (`n - 1` denominator),
/// it is computed once at construction and never changes afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Rescaler<F: Float> {
    mean: F,
    std: F,
}

impl<F: Float> Rescaler<F> {
    /// Constructor from raw targets `y` and their uncertainties `sigma`
    ///
    /// # Errors
    ///
    /// * [GpError::ShapeMismatch]: when `y` and `sigma` lengths differ
    /// * [GpError::DegenerateInput]: when less than 2 values are given or all `y` values are equal
    /// * [GpError::InvalidParameter]: when a value is not finite
    pub fn new(
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        sigma: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        check_len("sigma", sigma, y.len())?;
        if y.len() < 2 {
            return Err(GpError::DegenerateInput(format!(
                "at least 2 values are required to rescale data, got {}",
                y.len()
            )));
        }
        if y.iter().chain(sigma.iter()).any(|v| !v.is_finite()) {
            return Err(GpError::InvalidParameter(
                "rescaled values should be finite".to_string(),
            ));
        }
        let mean = y.mean().unwrap_or_else(F::zero);
        let std = y.std_axis(Axis(0), F::one())[()];
        let identical = y.iter().all(|v| *v == y[0]);
        if identical || !(std > F::zero()) || !std.is_finite() {
            return Err(GpError::DegenerateInput(
                "zero variance data: all values are identical".to_string(),
            ));
        }
        Ok(Rescaler { mean, std })
    }

    /// Mean of the training targets
    pub fn mean(&self) -> F {
        self.mean
    }

    /// Sample standard deviation of the training targets
    pub fn std(&self) -> F {
        self.std
    }

    /// Rescale `(y, sigma)` to `((y - mean) / std, sigma / std)`
    pub fn transform(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        sigma: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        check_len("sigma", sigma, y.len())?;
        Ok((
            y.mapv(|v| (v - self.mean) / self.std),
            sigma.mapv(|s| s / self.std),
        ))
    }

    /// Exact reverse of [`Rescaler::transform`]
    pub fn invert(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        sigma: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        check_len("sigma", sigma, y.len())?;
        Ok((self.invert_values(y), self.invert_std(sigma)))
    }

    /// Map rescaled values of any shape back to the original scale
    pub fn invert_values<D: Dimension>(
        &self,
        y: &ArrayBase<impl Data<Elem = F>, D>,
    ) -> Array<F, D> {
        y.mapv(|v| v * self.std + self.mean)
    }

    /// Map rescaled standard deviations back to the original scale
    pub fn invert_std<D: Dimension>(
        &self,
        sigma: &ArrayBase<impl Data<Elem = F>, D>,
    ) -> Array<F, D> {
        sigma.mapv(|s| s * self.std)
    }
}
