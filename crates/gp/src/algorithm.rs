use crate::covariance::{cross_covariance, query_covariance, query_variance, CovarianceBuilder};
use crate::errors::{GpError, Result, Stage};
use crate::kernels::Kernel;
use crate::optimization::HyperparameterOptimizer;
use crate::parameters::{GpParams, GpValidParams, LengthScaleTuning};
use crate::sampling::{sample, SamplingMethod};
use crate::solver::{
    log_marginal_likelihood, posterior_covariance, posterior_mean, posterior_variance,
    CholeskySolver,
};
use crate::utils::{check_len, check_same_dims};

use linfa::prelude::{DatasetBase, Fit, Float};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Default number of restarts for length scale optimization
pub const GP_OPTIM_N_START: usize = 10;
/// Minimum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MIN_EVAL: usize = 25;
/// Maximum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MAX_EVAL: usize = 200;

/// Internal parameters computed Gp during training
/// used later on in prediction computations
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(deserialize = "F: Deserialize<'de>"))
)]
pub(crate) struct GpInnerParams<F: Float> {
    /// Gaussian Process weights: solution of K.w = y
    weights: Array1<F>,
    /// Cholesky decomposition of the training covariance matrix K
    solver: CholeskySolver<F>,
}

/// Log marginal likelihood of `y` for the given `length_scale`
/// together with the internal parameters used for prediction
pub(crate) fn likelihood<F: Float, K: Kernel<F>>(
    kernel: &K,
    builder: &CovarianceBuilder<F>,
    y: &Array1<F>,
    length_scale: F,
) -> Result<(F, GpInnerParams<F>)> {
    let k = builder.build(kernel, length_scale)?;
    let solver = CholeskySolver::factorize(&k)?;
    let weights = solver.solve(y)?;
    let lml = log_marginal_likelihood(y, &weights, &solver)?;
    Ok((lml, GpInnerParams { weights, solver }))
}

/// A GP regression models the interpolated values as a realization
/// of a zero mean Gaussian process governed by a prior covariance kernel
/// `k(x, x')` depending on a single length scale parameter:
///
/// `Y(x) ~ GP(0, k(x, x'))`, observed as `y_i = Y(x_i) + e_i` with `e_i ~ Normal(0, noise_i)`
///
/// The length scale is either given or estimated by maximizing the log marginal likelihood
/// of the training data. Once fitted, the model is immutable: posterior mean, variance,
/// covariance and samples at query points are computed from the Cholesky factor of the
/// training covariance.
///
/// Targets are used as given: see [GpRegression](crate::GpRegression) for the pipeline
/// rescaling observations to zero mean and unit variance before fitting.
///
/// # Example
///
/// ```no_run
/// use gpfit::{kernels::SquaredExponentialKernel, GaussianProcess};
/// use linfa::prelude::*;
/// use ndarray::{array, Array, Axis};
///
/// let xt = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
/// let yt = xt.column(0).mapv(f64::sin);
///
/// let gp = GaussianProcess::<f64, SquaredExponentialKernel>::params(SquaredExponentialKernel())
///     .fit(&Dataset::new(xt, yt))
///     .expect("GP fitted");
///
/// let xtest = Array::linspace(0., 4., 41).insert_axis(Axis(1));
/// let (mean, var) = gp.predict_valvar(&xtest).expect("GP prediction");
/// let samples = gp.sample(&xtest, 10).expect("GP samples");
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize, K: Serialize",
        deserialize = "F: Deserialize<'de>, K: Deserialize<'de>"
    ))
)]
pub struct GaussianProcess<F: Float, K: Kernel<F>> {
    /// Kernel length scale
    length_scale: F,
    /// Log marginal likelihood value at length scale
    likelihood: F,
    /// Gaussian process internal fitted params
    inner_params: GpInnerParams<F>,
    /// Noise variances added to the training covariance diagonal
    noise: Array1<F>,
    /// Training dataset (input, output)
    pub(crate) training_data: (Array2<F>, Array1<F>),
    /// Parameters used to fit this model
    pub(crate) params: GpValidParams<F, K>,
}

impl<F: Float, K: Kernel<F>> fmt::Display for GaussianProcess<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(kernel={}, length_scale={}, likelihood={})",
            self.params.kernel, self.length_scale, self.likelihood,
        )
    }
}

impl<F: Float, K: Kernel<F>> GaussianProcess<F, K> {
    /// Gp parameters contructor
    pub fn params<NewKernel: Kernel<F>>(kernel: NewKernel) -> GpParams<F, NewKernel> {
        GpParams::new(kernel)
    }

    /// Predict output values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n scalar output values as a vector (n,).
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self._predict(x).map_err(|e| e.during(Stage::Predict))
    }

    /// Predict variance values at n given `x` points of nx components specified as a (n, nx) matrix.
    /// Returns n variance values as (n,) column vector.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self._predict_var(x).map_err(|e| e.during(Stage::Predict))
    }

    /// Predict standard deviations at n given `x` points specified as a (n, nx) matrix.
    pub fn predict_std(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        Ok(self.predict_var(x)?.mapv(|v| v.sqrt()))
    }

    /// Predict both output values and variance at n given `x` points of nx components
    pub fn predict_valvar(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let res = || -> Result<(Array1<F>, Array1<F>)> {
            let k_star = self._compute_cross_covariance(x)?;
            let mean = posterior_mean(&k_star, &self.inner_params.weights)?;
            let kss = query_variance(&self.params.kernel, x, self.length_scale)?;
            let var = posterior_variance(&k_star, &kss, &self.inner_params.solver)?;
            Ok((mean, var))
        };
        res().map_err(|e| e.during(Stage::Predict))
    }

    /// Predict posterior covariance matrix (n, n) at n given `x` points specified as a (n, nx) matrix
    pub fn predict_cov(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self._compute_covariance(x).map_err(|e| e.during(Stage::Predict))
    }

    fn _predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let k_star = self._compute_cross_covariance(x)?;
        posterior_mean(&k_star, &self.inner_params.weights)
    }

    fn _predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let k_star = self._compute_cross_covariance(x)?;
        let kss = query_variance(&self.params.kernel, x, self.length_scale)?;
        posterior_variance(&k_star, &kss, &self.inner_params.solver)
    }

    /// Compute covariance matrix given x points specified as a (n, nx) matrix
    fn _compute_covariance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let k_star = self._compute_cross_covariance(x)?;
        let kss = query_covariance(&self.params.kernel, x, self.length_scale)?;
        posterior_covariance(&k_star, &kss, &self.inner_params.solver)
    }

    /// Compute cross covariance (n_train, n) between training points and `x` points
    fn _compute_cross_covariance(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array2<F>> {
        check_same_dims(x, &self.training_data.0)?;
        cross_covariance(
            &self.params.kernel,
            &self.training_data.0,
            x,
            self.length_scale,
        )
    }

    /// Sample the gaussian process for `n_traj` trajectories using cholesky decomposition
    pub fn sample_chol(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
    ) -> Result<Array2<F>> {
        self.sample_with_seed(x, n_traj, self.params.seed, SamplingMethod::Cholesky)
    }

    /// Sample the gaussian process for `n_traj` trajectories using eigenvalues decomposition
    pub fn sample_eig(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
    ) -> Result<Array2<F>> {
        self.sample_with_seed(x, n_traj, self.params.seed, SamplingMethod::EigenValues)
    }

    /// Sample the gaussian process for `n_traj` trajectories using eigenvalues decomposition (alias of `sample_eig`)
    /// Returns a (n_traj, n) matrix, one trajectory per row.
    pub fn sample(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>, n_traj: usize) -> Result<Array2<F>> {
        self.sample_eig(x, n_traj)
    }

    /// Sample the gaussian process for `n_traj` trajectories at `x` points (n, nx)
    /// with a random generator seeded by `seed`, using either
    /// cholesky or eigenvalues decomposition of the posterior covariance matrix.
    /// The later one is recommended as cholesky decomposition suffer from occurence of ill-conditioned matrices
    /// when the number of x locations increase.
    pub fn sample_with_seed(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        n_traj: usize,
        seed: u64,
        method: SamplingMethod,
    ) -> Result<Array2<F>> {
        let res = || -> Result<Array2<F>> {
            let mean = self._predict(x)?;
            let cov = self._compute_covariance(x)?;
            sample(&mean, &cov, n_traj, seed, method)
        };
        res().map_err(|e| e.during(Stage::Sample))
    }

    /// Retrieve length scale hyperparameter
    pub fn length_scale(&self) -> F {
        self.length_scale
    }

    /// Retrieve log marginal likelihood value
    pub fn likelihood(&self) -> F {
        self.likelihood
    }

    /// Retrieve noise variances of training observations
    pub fn noise(&self) -> &Array1<F> {
        &self.noise
    }

    /// Retrieve kernel
    pub fn kernel(&self) -> &K {
        &self.params.kernel
    }

    /// Retrieve parameters used to fit this model
    pub fn params_used(&self) -> &GpValidParams<F, K> {
        &self.params
    }

    /// Retrieve training dataset (inputs, outputs)
    pub fn training_data(&self) -> &(Array2<F>, Array1<F>) {
        &self.training_data
    }

    /// Retrieve input and output dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.training_data.0.ncols(), 1)
    }
}

impl<F: Float, K: Kernel<F>, D: Data<Elem = F>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError> for GpValidParams<F, K>
{
    type Object = GaussianProcess<F, K>;

    /// Fit GP parameters using maximum likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        self.fit_xy(dataset.records(), dataset.targets())
            .map_err(|e| e.during(Stage::Fit))
    }
}

impl<F: Float, K: Kernel<F>> GpValidParams<F, K> {
    pub(crate) fn fit_xy(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<GaussianProcess<F, K>> {
        if x.nrows() == 0 {
            return Err(GpError::DegenerateInput(
                "at least one training point is required".to_string(),
            ));
        }
        check_len("y", y, x.nrows())?;
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(GpError::InvalidParameter(
                "training data should be finite".to_string(),
            ));
        }
        let y = y.to_owned();
        let noise = self.alpha().noise_variances(x.nrows())?;
        let builder = CovarianceBuilder::new(x, &noise)?;

        let (length_scale, jitter) = match self.length_scale_tuning() {
            LengthScaleTuning::Fixed(length_scale) => {
                // Easy path no optimization
                (*length_scale, F::zero())
            }
            LengthScaleTuning::Optimized { init, bounds } => {
                let now = Instant::now();
                let optimizer = HyperparameterOptimizer::new(self.kernel, *init, *bounds)
                    .n_restarts(self.n_restarts())
                    .max_eval(self.max_eval())
                    .seed(self.seed());
                let res = match optimizer.fit_with(&builder, &y) {
                    Ok(fit) => (fit.length_scale, fit.jitter),
                    Err(GpError::FitFailure(msg)) => {
                        let init = init.max(bounds.0).min(bounds.1);
                        warn!("Length scale optimization failed ({msg}), use initial guess {init}");
                        (init, F::zero())
                    }
                    Err(err) => return Err(err),
                };
                debug!("elapsed fit = {:?}", now.elapsed().as_millis());
                res
            }
        };

        let builder = builder.with_extra_jitter(jitter);
        let (likelihood, inner_params) = likelihood(&self.kernel, &builder, &y, length_scale)?;
        info!(
            "GP fitted with {} kernel: length scale = {length_scale}, log marginal likelihood = {likelihood}",
            self.kernel
        );
        Ok(GaussianProcess {
            length_scale,
            likelihood,
            inner_params,
            noise: builder.noise().to_owned(),
            training_data: (x.to_owned(), y),
            params: self.clone(),
        })
    }
}
