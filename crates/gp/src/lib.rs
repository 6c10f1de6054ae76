//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//! of noisy scalar observations `(x, y, sigma)`.
//!
//! The GP machinery is split into small components:
//! * [kernels]: stationary covariance functions parameterized by a single length scale,
//! * [Rescaler]: zero mean / unit variance rescaling of observations and its inverse,
//! * [covariance]: training, cross and query covariance matrices,
//! * [solver]: Cholesky factorization, posterior mean/variance/covariance and log marginal likelihood,
//! * [HyperparameterOptimizer]: multistart maximization of the log marginal likelihood over the length scale,
//! * [sampling]: draws from the posterior multivariate gaussian distribution.
//!
//! GP methods are implemented by [GaussianProcess] parameterized by [GpParams].
//! The end-to-end pipeline (rescaling, fit, predictions and samples in original scale)
//! is implemented by [GpRegression] built from [Observations] with [GpParams::fit_observations].
//!
//! # Features
//!
//! ## serializable
//!
//! The `serializable` feature enables the serialization of parameters and fitted models
//! using the [`serde crate`](https://serde.rs/).
//!
//! ## persistent
//!
//! The `persistent` feature enables `save()` and `load()` methods of [GpRegression]
//! to/from a json file using the [`serde_json crate`](https://docs.serde.rs/serde_json/).
//!
//! ## nlopt
//!
//! The `nlopt` feature uses the COBYLA implementation of the [NLOpt library](https://nlopt.readthedocs.io)
//! instead of the default pure Rust [cobyla](https://crates.io/crates/cobyla) crate for length scale optimization.
//!
//! # Example
//!
//! ```no_run
//! use gpfit::{kernels::SquaredExponentialKernel, GpParams, Observations};
//! use ndarray::{array, Array, Axis};
//!
//! let obs = Observations::from_1d(&array![10., 12.], &array![50., 80.], &array![0., 0.])
//!     .expect("valid observations");
//! let reg = GpParams::new(SquaredExponentialKernel())
//!     .length_scale_bounds((0.01, 1000.))
//!     .n_restarts_optimizer(9)
//!     .fit_observations(&obs)
//!     .expect("GP fitted");
//!
//! let xgrid = Array::linspace(8., 14., 100).insert_axis(Axis(1));
//! let pred = reg.predict(&xgrid).expect("GP prediction");
//! let samples = reg.sample(&xgrid, 5).expect("GP samples");
//! println!("length scale = {}", reg.length_scale());
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod covariance;
mod errors;
pub mod kernels;
mod optimization;
mod parameters;
mod regression;
mod rescaler;
pub mod sampling;
pub mod solver;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use optimization::{
    HyperparameterOptimizer, LengthScaleFit, INITIAL_RETRY_JITTER, MAX_JITTER_ROUNDS,
};
pub use parameters::*;
pub use regression::*;
pub use rescaler::*;
pub use sampling::SamplingMethod;
pub use utils::DiffMatrix;
