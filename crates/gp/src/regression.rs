//! End-to-end regression of noisy observations `(x, y, sigma)`.
//!
//! Observations are rescaled to zero mean and unit variance, the GP is fitted
//! on rescaled targets with noise variances `(sigma / std)^2`, then predictions
//! and samples are mapped back to the original scale.

use crate::algorithm::GaussianProcess;
use crate::errors::{GpError, Result, Stage};
use crate::kernels::Kernel;
use crate::parameters::{Alpha, GpParams, GpValidParams};
use crate::rescaler::Rescaler;
use crate::sampling::SamplingMethod;
use crate::utils::check_len;

use linfa::{Float, ParamGuard};
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "persistent")]
use serde::de::DeserializeOwned;
#[cfg(feature = "persistent")]
use std::fs;
#[cfg(feature = "persistent")]
use std::io::Write;

/// Noisy scalar observations: inputs `x` (n, nx), outputs `y` (n,)
/// and output standard deviations `sigma` (n,)
#[derive(Clone, Debug, PartialEq)]
pub struct Observations<F: Float> {
    x: Array2<F>,
    y: Array1<F>,
    sigma: Array1<F>,
}

impl<F: Float> Observations<F> {
    /// Constructor checking consistency of observations
    ///
    /// # Errors
    ///
    /// * [GpError::ShapeMismatch]: when lengths of `x`, `y` and `sigma` differ
    /// * [GpError::DegenerateInput]: when no observation is given
    /// * [GpError::InvalidParameter]: when a value is not finite or `sigma` is negative
    pub fn new(
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        sigma: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        check_len("y", y, x.nrows())?;
        check_len("sigma", sigma, x.nrows())?;
        if x.nrows() == 0 {
            return Err(GpError::DegenerateInput(
                "at least one observation is required".to_string(),
            ));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(GpError::InvalidParameter(
                "observations should be finite".to_string(),
            ));
        }
        if sigma.iter().any(|s| !(*s >= F::zero()) || !s.is_finite()) {
            return Err(GpError::InvalidParameter(
                "sigma values should be positive or zero and finite".to_string(),
            ));
        }
        Ok(Observations {
            x: x.to_owned(),
            y: y.to_owned(),
            sigma: sigma.to_owned(),
        })
    }

    /// Constructor from one-dimensional inputs
    pub fn from_1d(
        x: &ArrayBase<impl Data<Elem = F>, Ix1>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        sigma: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        Self::new(&x.view().insert_axis(Axis(1)), y, sigma)
    }

    /// Inputs (n, nx)
    pub fn x(&self) -> &Array2<F> {
        &self.x
    }

    /// Outputs (n,)
    pub fn y(&self) -> &Array1<F> {
        &self.y
    }

    /// Output standard deviations (n,)
    pub fn sigma(&self) -> &Array1<F> {
        &self.sigma
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Whether there is no observation (never true for a constructed value)
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Posterior predictive distribution at query points
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction<F: Float> {
    /// Posterior mean
    pub mean: Array1<F>,
    /// Posterior standard deviation
    pub std: Array1<F>,
}

/// A GP fitted on rescaled observations together with the [Rescaler] used,
/// predictions and samples being given in the original output scale.
#[derive(Clone, Debug)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct GpRegression<F: Float, K: Kernel<F>> {
    gp: GaussianProcess<F, K>,
    rescaler: Rescaler<F>,
}

impl<F: Float, K: Kernel<F>> GpRegression<F, K> {
    /// Posterior mean and standard deviation at `x` points (n, nx)
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Prediction<F>> {
        let (mean, var) = self.gp.predict_valvar(x)?;
        Ok(Prediction {
            mean: self.rescaler.invert_values(&mean),
            std: self.rescaler.invert_std(&var.mapv(|v| v.sqrt())),
        })
    }

    /// Draw `n_samples` posterior functions at `x` points (n, nx),
    /// returned as a (n_samples, n) matrix
    pub fn sample(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_samples: usize,
    ) -> Result<Array2<F>> {
        Ok(self.rescaler.invert_values(&self.gp.sample(x, n_samples)?))
    }

    /// Same as [GpRegression::sample] with given seed and covariance decomposition method
    pub fn sample_with_seed(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_samples: usize,
        seed: u64,
        method: SamplingMethod,
    ) -> Result<Array2<F>> {
        let samples = self.gp.sample_with_seed(x, n_samples, seed, method)?;
        Ok(self.rescaler.invert_values(&samples))
    }

    /// Underlying GP working on rescaled outputs
    pub fn gp(&self) -> &GaussianProcess<F, K> {
        &self.gp
    }

    /// Rescaler of outputs
    pub fn rescaler(&self) -> &Rescaler<F> {
        &self.rescaler
    }

    /// Fitted kernel length scale
    pub fn length_scale(&self) -> F {
        self.gp.length_scale()
    }
}

#[cfg(feature = "persistent")]
impl<F: Float + Serialize, K: Kernel<F> + Serialize> GpRegression<F, K> {
    /// Save the fitted model as a JSON file
    pub fn save(&self, path: &str) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = serde_json::to_vec(self)?;
        file.write_all(&bytes)?;
        Ok(())
    }
}

#[cfg(feature = "persistent")]
impl<F: Float + DeserializeOwned, K: Kernel<F> + DeserializeOwned> GpRegression<F, K> {
    /// Load a model from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read(path)?;
        let model = serde_json::from_slice(&data)?;
        Ok(model)
    }
}

impl<F: Float, K: Kernel<F>> GpValidParams<F, K> {
    /// Fit a GP on rescaled `observations`.
    ///
    /// Noise variances of the GP are the rescaled variances `(sigma / std)^2`
    /// plus the configured `alpha` term.
    pub fn fit_observations(&self, observations: &Observations<F>) -> Result<GpRegression<F, K>> {
        let res = || -> Result<GpRegression<F, K>> {
            let rescaler = Rescaler::new(observations.y(), observations.sigma())?;
            debug!(
                "Rescale observations with mean = {} and std = {}",
                rescaler.mean(),
                rescaler.std()
            );
            let (y, sigma) = rescaler.transform(observations.y(), observations.sigma())?;
            let noise =
                sigma.mapv(|s| s * s) + self.alpha().noise_variances(observations.len())?;
            let params = GpValidParams {
                alpha: Alpha::Noise(noise),
                ..self.clone()
            };
            let gp = params.fit_xy(observations.x(), &y)?;
            Ok(GpRegression { gp, rescaler })
        };
        res().map_err(|e| e.during(Stage::Fit))
    }
}

impl<F: Float, K: Kernel<F>> GpParams<F, K> {
    /// Check parameters then fit a GP on rescaled `observations`,
    /// see [GpValidParams::fit_observations]
    pub fn fit_observations(&self, observations: &Observations<F>) -> Result<GpRegression<F, K>> {
        self.check_ref()
            .map_err(|e| e.during(Stage::Fit))?
            .fit_observations(observations)
    }
}
