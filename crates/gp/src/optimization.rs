//! Length scale hyperparameter estimation by log marginal likelihood maximization.
//!
//! Local searches are done with COBYLA on `log10(length_scale)` from several
//! start points, the best local optimum being kept.

use crate::algorithm::likelihood;
use crate::covariance::CovarianceBuilder;
use crate::errors::{GpError, Result};
use crate::kernels::Kernel;
use crate::parameters::check_length_scale_search;
use crate::utils::{check_len, into_f64};
use crate::{GP_COBYLA_MAX_EVAL, GP_OPTIM_N_START};

use egobox_doe::{Lhs, LhsKind, SamplingMethod as _};
use linfa::Float;
use log::{debug, warn};
use ndarray::{array, s, Array1, ArrayBase, Data, Ix1, Ix2};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::time::Instant;

/// Max number of optimization rounds retried with an increased jitter
/// when no restart manages to factorize the training covariance
pub const MAX_JITTER_ROUNDS: usize = 5;
/// Extra jitter used for the first retried round, then multiplied by 10 at each round
pub const INITIAL_RETRY_JITTER: f64 = 1e-8;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: GP_COBYLA_MAX_EVAL,
        }
    }
}

/// Multistart points in log10 space: the initial guess clamped to the bounds
/// followed by `n_restarts` points from a latin hypercube over the bounds.
/// Returns start points and log10 bounds.
pub(crate) fn prepare_multistart<F: Float>(
    n_restarts: usize,
    init: F,
    bounds: (F, F),
    seed: u64,
) -> (Array1<f64>, (f64, f64)) {
    // Use log10 length scale as optimization parameter
    let (lo, up) = (into_f64(bounds.0).log10(), into_f64(bounds.1).log10());

    let mut starts = Array1::zeros(n_restarts + 1);
    starts[0] = into_f64(init).log10().clamp(lo, up);
    match n_restarts.cmp(&1) {
        Ordering::Equal => {
            let mut rng = Xoshiro256Plus::seed_from_u64(seed);
            starts[1] = lo + (up - lo) * rng.gen::<f64>();
        }
        Ordering::Greater => {
            let seeds = Lhs::new(&array![[lo, up]])
                .kind(LhsKind::Maximin)
                .with_rng(Xoshiro256Plus::seed_from_u64(seed))
                .sample(n_restarts);
            starts.slice_mut(s![1..]).assign(&seeds.column(0));
        }
        Ordering::Less => (),
    };
    (starts, (lo, up))
}

/// Optimize gp hyper parameter given an initial guess and bounds with NLOPT::Cobyla
#[cfg(feature = "nlopt")]
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: f64,
    bounds: (f64, f64),
    cobyla: CobylaParams,
) -> (f64, f64)
where
    ObjF: Fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64,
{
    use nlopt::*;

    let mut optimizer = Nlopt::new(Algorithm::Cobyla, 1, objfn, Target::Minimize, ());
    let mut param = [param0];

    let setup = optimizer
        .set_lower_bounds(&[bounds.0])
        .and_then(|_| optimizer.set_upper_bounds(&[bounds.1]))
        .and_then(|_| optimizer.set_initial_step1(cobyla.rhobeg))
        .and_then(|_| optimizer.set_maxeval(cobyla.maxeval as u32))
        .and_then(|_| optimizer.set_ftol_rel(cobyla.ftol_rel));
    if setup.is_err() {
        warn!("NLOPT Cobyla setup failure in GP");
        return (f64::INFINITY, param0);
    }

    match optimizer.optimize(&mut param) {
        Ok((_, fmin)) => {
            let fval = if f64::is_nan(fmin) {
                f64::INFINITY
            } else {
                fmin
            };
            (fval, param[0])
        }
        Err((status, _)) => {
            warn!("ERROR NLOPT Cobyla optimizer in GP status={status:?}");
            (f64::INFINITY, param[0])
        }
    }
}

/// Optimize gp hyper parameter given an initial guess and bounds with cobyla
#[cfg(not(feature = "nlopt"))]
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: f64,
    bounds: (f64, f64),
    cobyla: CobylaParams,
) -> (f64, f64)
where
    ObjF: Fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64,
{
    use cobyla::{minimize, Func, RhoBeg, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];

    match minimize(
        |x, u| objfn(x, None, u),
        &[param0],
        &[bounds],
        &cons,
        (),
        cobyla.maxeval,
        RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if f64::is_nan(fval) {
                f64::INFINITY
            } else {
                fval
            };
            (fval, x_opt.first().copied().unwrap_or(param0))
        }
        Err((status, x_opt, _)) => {
            warn!("ERROR Cobyla optimizer in GP status={status:?}");
            (f64::INFINITY, x_opt.first().copied().unwrap_or(param0))
        }
    }
}

/// Result of a length scale estimation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LengthScaleFit<F: Float> {
    /// Best length scale found
    pub length_scale: F,
    /// Log marginal likelihood at the best length scale
    pub likelihood: F,
    /// Jitter added to the noise variances to get factorizable covariances (zero most of the time)
    pub jitter: F,
}

/// Multi-restart log marginal likelihood maximizer over the kernel length scale
#[derive(Clone, Debug)]
pub struct HyperparameterOptimizer<F: Float, K: Kernel<F>> {
    kernel: K,
    init: F,
    bounds: (F, F),
    n_restarts: usize,
    max_eval: usize,
    seed: u64,
}

impl<F: Float, K: Kernel<F>> HyperparameterOptimizer<F, K> {
    /// Constructor given the kernel, the initial length scale guess and its bounds
    pub fn new(kernel: K, init: F, bounds: (F, F)) -> Self {
        HyperparameterOptimizer {
            kernel,
            init,
            bounds,
            n_restarts: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            seed: 0,
        }
    }

    /// Set the number of restarts in addition to the one started from the initial guess
    pub fn n_restarts(mut self, n_restarts: usize) -> Self {
        self.n_restarts = n_restarts;
        self
    }

    /// Set the max number of likelihood evaluations of one local search
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.max_eval = max_eval;
        self
    }

    /// Set the seed used to draw restart points
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Estimate the length scale maximizing the log marginal likelihood of `y` (n,)
    /// observed at `x` (n, nx) with the given `noise` variances (n,).
    ///
    /// # Errors
    ///
    /// * [GpError::InvalidParameter]: when the initial guess is not a valid length scale
    ///   or bounds do not verify `0 < lower <= upper`
    /// * [GpError::FitFailure]: when no candidate covariance could be factorized,
    ///   even after jitter escalation. Callers may fall back to the initial guess.
    pub fn fit(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        noise: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<LengthScaleFit<F>> {
        check_len("y", y, x.nrows())?;
        let builder = CovarianceBuilder::new(x, noise)?;
        self.fit_with(&builder, &y.to_owned())
    }

    pub(crate) fn fit_with(
        &self,
        builder: &CovarianceBuilder<F>,
        y: &Array1<F>,
    ) -> Result<LengthScaleFit<F>> {
        check_length_scale_search(self.init, self.bounds)?;
        let (starts, bounds) =
            prepare_multistart(self.n_restarts, self.init, self.bounds, self.seed);
        if self.bounds.0 < self.bounds.1 {
            debug!(
                "Optimize with multistart log10(length scale) = {starts} and bounds = {bounds:?}"
            );
        } else {
            debug!("Length scale bounds reduced to {}, no optimization", self.bounds.0);
        }

        let mut jitter = F::zero();
        for round in 0..=MAX_JITTER_ROUNDS {
            let current = builder.with_extra_jitter(jitter);
            let best = if self.bounds.0 < self.bounds.1 {
                self.multistart(&current, y, &starts, bounds)
            } else {
                likelihood(&self.kernel, &current, y, self.bounds.0)
                    .ok()
                    .map(|(lml, _)| (lml, self.bounds.0))
            };
            if let Some((likelihood, length_scale)) = best {
                return Ok(LengthScaleFit {
                    length_scale,
                    likelihood,
                    jitter,
                });
            }
            jitter = if round == 0 {
                F::cast(INITIAL_RETRY_JITTER)
            } else {
                jitter * F::cast(10.)
            };
            if round < MAX_JITTER_ROUNDS {
                warn!("Every likelihood optimization restart failed, retry with jitter {jitter}");
            }
        }
        Err(GpError::FitFailure(format!(
            "no factorizable covariance found with {} restarts and up to {} jitter rounds",
            starts.len(),
            MAX_JITTER_ROUNDS
        )))
    }

    /// Run every local search, returns best (likelihood, length scale) if any succeeded
    fn multistart(
        &self,
        builder: &CovarianceBuilder<F>,
        y: &Array1<F>,
        starts: &Array1<f64>,
        bounds: (f64, f64),
    ) -> Option<(F, F)> {
        let base: f64 = 10.;
        let objfn = |x: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
            let length_scale = F::cast(base.powf(x[0]));
            // optimizer may return nan or out of range values
            if !length_scale.is_finite() || !(length_scale > F::zero()) {
                return f64::INFINITY;
            }
            match likelihood(&self.kernel, builder, y, length_scale) {
                Ok((lml, _)) => -into_f64(lml),
                Err(_) => f64::INFINITY,
            }
        };

        let now = Instant::now();
        let (index, fval, log_ls) = (0..starts.len())
            .into_par_iter()
            .map(|i| {
                let (fval, x) = optimize_params(
                    objfn,
                    starts[i],
                    bounds,
                    CobylaParams {
                        maxeval: self.max_eval,
                        ..CobylaParams::default()
                    },
                );
                (i, fval, x)
            })
            .reduce(
                || (usize::MAX, f64::INFINITY, f64::NAN),
                |a, b| {
                    if b.1 < a.1 || (b.1 == a.1 && b.0 < a.0) {
                        b
                    } else {
                        a
                    }
                },
            );
        debug!("elapsed optim = {:?}", now.elapsed().as_millis());

        if !fval.is_finite() {
            return None;
        }
        debug!("Best restart #{index}: log10(length scale) = {log_ls}, -lml = {fval}");
        let length_scale = F::cast(base.powf(log_ls))
            .max(self.bounds.0)
            .min(self.bounds.1);
        Some((F::cast(-fval), length_scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{Matern52Kernel, SquaredExponentialKernel};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array, Array2};
    use ndarray_rand::rand_distr::{Normal, Uniform};
    use ndarray_rand::RandomExt;
    use std::fmt;

    #[test]
    fn test_prepare_multistart() {
        let (starts, bounds) = prepare_multistart(4, 1e7, (0.01, 1000.), 0);
        assert_abs_diff_eq!(-2., bounds.0, epsilon = 1e-12);
        assert_abs_diff_eq!(3., bounds.1, epsilon = 1e-12);
        assert_eq!(5, starts.len());
        // initial guess clamped to the upper bound
        assert_abs_diff_eq!(3., starts[0], epsilon = 1e-12);

        // one point per stratum
        let mut strata: Vec<usize> = starts
            .iter()
            .skip(1)
            .map(|v| ((v + 2.) / 1.25).floor() as usize)
            .collect();
        strata.sort();
        assert_eq!(vec![0, 1, 2, 3], strata);

        let (again, _) = prepare_multistart(4, 1e7, (0.01, 1000.), 0);
        assert_eq!(starts, again);
        let (other, _) = prepare_multistart(4, 1e7, (0.01, 1000.), 1);
        assert_ne!(starts, other);
    }

    #[test]
    fn test_two_points_likelihood_maximized_at_small_length_scales() {
        // rescaled y of [50, 80] at x = [10, 12]
        let x = array![[10.], [12.]];
        let y = array![-f64::sqrt(0.5), f64::sqrt(0.5)];
        let noise = array![0., 0.];
        let fit = HyperparameterOptimizer::new(SquaredExponentialKernel(), 1., (0.01, 1000.))
            .n_restarts(9)
            .seed(0)
            .fit(&x, &y, &noise)
            .unwrap();
        assert!(fit.length_scale < 1.);
        assert!(fit.length_scale >= 0.01 * (1. - 1e-9));
        assert_eq!(0., fit.jitter);
        // uncorrelated limit: -1/2 |y|^2 - log(2 pi)
        let expected = -0.5 - f64::ln(2. * std::f64::consts::PI);
        assert_abs_diff_eq!(expected, fit.likelihood, epsilon = 1e-3);
    }

    #[test]
    fn test_recovers_data_length_scale() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array::linspace(0., 10., 30).insert_axis(ndarray::Axis(1));
        let y = x.column(0).mapv(|v: f64| (v / 2.).sin())
            + Array::random_using(30, Normal::new(0., 0.05).unwrap(), &mut rng);
        let noise = Array1::from_elem(30, 0.05 * 0.05);
        let fit = HyperparameterOptimizer::new(Matern52Kernel(), 1., (1e-2, 1e2))
            .n_restarts(5)
            .fit(&x, &y, &noise)
            .unwrap();
        // smooth signal with ~12 units period
        assert!(fit.length_scale > 0.5 && fit.length_scale < 20.);

        // best result is at least as good as every start point
        for ls in [0.01, 0.1, 1., 10., 100.] {
            let builder = CovarianceBuilder::new(&x, &noise).unwrap();
            let (lml, _) = likelihood(&Matern52Kernel(), &builder, &y, ls).unwrap();
            assert!(fit.likelihood >= lml - 1e-6);
        }
    }

    #[test]
    fn test_deterministic_given_seed() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let x = Array::random_using((12, 1), Uniform::new(0., 5.), &mut rng);
        let y = x.column(0).mapv(|v: f64| v * v.cos());
        let noise = Array1::from_elem(12, 1e-4);
        let optimizer =
            HyperparameterOptimizer::new(SquaredExponentialKernel(), 1., (1e-3, 1e3)).seed(7);
        let fit1 = optimizer.fit(&x, &y, &noise).unwrap();
        let fit2 = optimizer.fit(&x, &y, &noise).unwrap();
        assert_eq!(fit1, fit2);
    }

    /// Correlation greater than variance: no covariance matrix built from it is positive definite
    #[derive(Clone, Copy, Debug, Default)]
    struct OverCorrelatedKernel;

    impl fmt::Display for OverCorrelatedKernel {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "OverCorrelated")
        }
    }

    impl Kernel<f64> for OverCorrelatedKernel {
        fn value(&self, d: &ArrayBase<impl Data<Elem = f64>, Ix2>, _ls: f64) -> Array1<f64> {
            d.rows()
                .into_iter()
                .map(|row| if row.iter().all(|v| *v == 0.) { 1. } else { 2. })
                .collect()
        }
    }

    #[test]
    fn test_fit_failure() {
        let x: Array2<f64> = array![[0.], [1.], [2.]];
        let y = array![0., 1., 0.];
        let noise = array![0., 0., 0.];
        let res = HyperparameterOptimizer::new(OverCorrelatedKernel, 1., (0.1, 10.))
            .n_restarts(2)
            .max_eval(25)
            .fit(&x, &y, &noise);
        assert!(matches!(res, Err(GpError::FitFailure(_))));
    }

    #[test]
    fn test_invalid_search_space() {
        let x = array![[0.], [1.], [2.]];
        let y = array![0., 1., 0.];
        let noise = array![0., 0., 0.];
        let bad = [
            (1., (10., 1.)),
            (1., (-1., 10.)),
            (1., (0., 10.)),
            (-1., (1., 10.)),
        ];
        for (init, bounds) in bad {
            let res = HyperparameterOptimizer::new(SquaredExponentialKernel(), init, bounds)
                .fit(&x, &y, &noise);
            assert!(matches!(res, Err(GpError::InvalidParameter(_))));
        }
    }

    #[test]
    fn test_equal_bounds() {
        let x = array![[0.], [1.], [2.]];
        let y = array![0., 1., 0.];
        let noise = array![0., 0., 0.];
        let fit = HyperparameterOptimizer::new(SquaredExponentialKernel(), 1., (2., 2.))
            .fit(&x, &y, &noise)
            .unwrap();
        assert_eq!(2., fit.length_scale);
        assert_eq!(0., fit.jitter);
        let builder = CovarianceBuilder::new(&x, &noise).unwrap();
        let (lml, _) = likelihood(&SquaredExponentialKernel(), &builder, &y, 2.).unwrap();
        assert_abs_diff_eq!(lml, fit.likelihood, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let res = HyperparameterOptimizer::new(SquaredExponentialKernel(), 1., (0.1, 10.)).fit(
            &array![[0.], [1.]],
            &array![0., 1., 2.],
            &array![0., 0.],
        );
        assert!(matches!(res, Err(GpError::ShapeMismatch(_))));
    }
}
