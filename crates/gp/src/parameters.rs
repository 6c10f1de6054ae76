use crate::errors::{GpError, Result};
use crate::kernels::{check_length_scale, Kernel};
use crate::{GP_COBYLA_MAX_EVAL, GP_COBYLA_MIN_EVAL, GP_OPTIM_N_START};
use linfa::{Float, ParamGuard};

use ndarray::Array1;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// An enum to represent the length scale hyperparameter tuning
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum LengthScaleTuning<F: Float> {
    /// Constant parameter (ie given not estimated)
    Fixed(F),
    /// Parameter is optimized between given bounds (lower, upper) starting from the inital guess
    Optimized {
        /// Initial guess for the parameter
        init: F,
        /// Bounds for the parameter (lower, upper)
        bounds: (F, F),
    },
}

impl<F: Float> Default for LengthScaleTuning<F> {
    fn default() -> Self {
        LengthScaleTuning::Optimized {
            init: F::cast(LengthScaleTuning::<F>::DEFAULT_INIT),
            bounds: (
                F::cast(LengthScaleTuning::<F>::DEFAULT_BOUNDS.0),
                F::cast(LengthScaleTuning::<F>::DEFAULT_BOUNDS.1),
            ),
        }
    }
}

impl<F: Float> LengthScaleTuning<F> {
    /// Default initial length scale value
    pub const DEFAULT_INIT: f64 = 1.;
    /// Default bounds for length scale values
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-5, 1e5);

    /// Get initial length scale value
    pub fn init(&self) -> F {
        match self {
            LengthScaleTuning::Fixed(init) => *init,
            LengthScaleTuning::Optimized { init, bounds: _ } => *init,
        }
    }

    /// Get bounds for length scale value
    pub fn bounds(&self) -> Option<(F, F)> {
        match self {
            LengthScaleTuning::Fixed(_) => None,
            LengthScaleTuning::Optimized { init: _, bounds } => Some(*bounds),
        }
    }
}

/// Check the initial guess is a valid length scale and bounds verify `0 < lower <= upper`
pub(crate) fn check_length_scale_search<F: Float>(init: F, bounds: (F, F)) -> Result<()> {
    check_length_scale(init)?;
    let (lo, up) = bounds;
    if !(lo > F::zero()) || !lo.is_finite() || !up.is_finite() || lo > up {
        return Err(GpError::InvalidParameter(format!(
            "length scale bounds should verify 0 < lower <= upper, got ({lo}, {up})"
        )));
    }
    Ok(())
}

/// Diagonal term added to the training covariance matrix
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub enum Alpha<F: Float> {
    /// Same value added to every diagonal term
    Jitter(F),
    /// Noise variance of each training observation
    Noise(Array1<F>),
}

impl<F: Float> Default for Alpha<F> {
    fn default() -> Self {
        Alpha::Jitter(F::cast(Alpha::<F>::DEFAULT_JITTER))
    }
}

impl<F: Float> Alpha<F> {
    /// Default jitter value
    pub const DEFAULT_JITTER: f64 = 1e-10;

    /// Noise variances vector for `n_obs` training observations
    pub fn noise_variances(&self, n_obs: usize) -> Result<Array1<F>> {
        match self {
            Alpha::Jitter(v) => Ok(Array1::from_elem(n_obs, *v)),
            Alpha::Noise(noise) => {
                if noise.len() != n_obs {
                    return Err(GpError::ShapeMismatch(format!(
                        "alpha noise variances length should be {n_obs}, got {}",
                        noise.len()
                    )));
                }
                Ok(noise.to_owned())
            }
        }
    }

    fn check(&self) -> Result<()> {
        let valid = |v: &F| *v >= F::zero() && v.is_finite();
        let ok = match self {
            Alpha::Jitter(v) => valid(v),
            Alpha::Noise(noise) => noise.iter().all(valid),
        };
        if !ok {
            return Err(GpError::InvalidParameter(
                "alpha values should be positive or zero and finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// A set of validated GP parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct GpValidParams<F: Float, K: Kernel<F>> {
    /// Covariance function
    pub(crate) kernel: K,
    /// Length scale tuning hint of the kernel
    pub(crate) length_scale_tuning: LengthScaleTuning<F>,
    /// Number of internal likelihood optimization restarts
    pub(crate) n_restarts: usize,
    /// Max number of internal likelihood evaluation during one optimization
    pub(crate) max_eval: usize,
    /// Diagonal term added to the training covariance
    pub(crate) alpha: Alpha<F>,
    /// Seed of the random generator used for optimization restarts and sampling
    pub(crate) seed: u64,
}

impl<F: Float, K: Kernel<F>> Default for GpValidParams<F, K> {
    fn default() -> GpValidParams<F, K> {
        GpValidParams {
            kernel: K::default(),
            length_scale_tuning: LengthScaleTuning::default(),
            n_restarts: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            alpha: Alpha::default(),
            seed: 0,
        }
    }
}

impl<F: Float, K: Kernel<F>> GpValidParams<F, K> {
    /// Get covariance function k(x, x')
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Get length scale tuning
    pub fn length_scale_tuning(&self) -> &LengthScaleTuning<F> {
        &self.length_scale_tuning
    }

    /// Get the number of internal optimization restarts
    pub fn n_restarts(&self) -> usize {
        self.n_restarts
    }

    /// Get the max number of internal likelihood evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get the diagonal term added to the training covariance
    pub fn alpha(&self) -> &Alpha<F> {
        &self.alpha
    }

    /// Get the random seed
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP algorithm](crate::GaussianProcess).
pub struct GpParams<F: Float, K: Kernel<F>>(pub(crate) GpValidParams<F, K>);

impl<F: Float, K: Kernel<F>> GpParams<F, K> {
    /// A constructor for GP parameters given a kernel
    pub fn new(kernel: K) -> GpParams<F, K> {
        Self(GpValidParams {
            kernel,
            ..Default::default()
        })
    }

    /// Set kernel.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set value for length scale hyper parameter.
    ///
    /// When length scale is optimized, the internal optimization is started from `length_scale`.
    /// When length scale is fixed, this set length scale constant value.
    pub fn length_scale(mut self, length_scale: F) -> Self {
        self.0.length_scale_tuning = match self.0.length_scale_tuning {
            LengthScaleTuning::Optimized { init: _, bounds } => LengthScaleTuning::Optimized {
                init: length_scale,
                bounds,
            },
            LengthScaleTuning::Fixed(_) => LengthScaleTuning::Fixed(length_scale),
        };
        self
    }

    /// Set length scale hyper parameter search space.
    ///
    /// This function is no-op when length scale tuning is fixed
    pub fn length_scale_bounds(mut self, bounds: (F, F)) -> Self {
        self.0.length_scale_tuning = match self.0.length_scale_tuning {
            LengthScaleTuning::Optimized { init, bounds: _ } => {
                LengthScaleTuning::Optimized { init, bounds }
            }
            LengthScaleTuning::Fixed(f) => LengthScaleTuning::Fixed(f),
        };
        self
    }

    /// Set length scale hyper parameter tuning
    pub fn length_scale_tuning(mut self, tuning: LengthScaleTuning<F>) -> Self {
        self.0.length_scale_tuning = tuning;
        self
    }

    /// Set the number of internal length scale optimization restarts
    /// in addition to the one started from the initial guess
    pub fn n_restarts_optimizer(mut self, n_restarts: usize) -> Self {
        self.0.n_restarts = n_restarts;
        self
    }

    /// Set the max number of internal likelihood evaluations during one optimization
    /// Given max_eval has to be greater than [crate::GP_COBYLA_MIN_EVAL] otherwise
    /// max_eval is set to [crate::GP_COBYLA_MIN_EVAL].
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = GP_COBYLA_MIN_EVAL.max(max_eval);
        self
    }

    /// Set the diagonal term of the training covariance
    /// either as a jitter or as per-point noise variances.
    pub fn alpha(mut self, alpha: Alpha<F>) -> Self {
        self.0.alpha = alpha;
        self
    }

    /// Set the seed used to generate optimization start points and posterior samples
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float, K: Kernel<F>> ParamGuard for GpParams<F, K> {
    type Checked = GpValidParams<F, K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        match self.0.length_scale_tuning {
            LengthScaleTuning::Fixed(length_scale) => check_length_scale(length_scale)?,
            LengthScaleTuning::Optimized {
                init,
                bounds: (lo, up),
            } => check_length_scale_search(init, (lo, up))?,
        }
        self.0.alpha.check()?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
