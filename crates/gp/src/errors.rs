use std::fmt;
use thiserror::Error;

/// A result type for GP regression algorithm
pub type Result<T> = std::result::Result<T, GpError>;

/// Public operation during which an error was raised
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Model fitting (rescaling, covariance setup, hyperparameter optimization)
    Fit,
    /// Posterior mean/variance computation
    Predict,
    /// Posterior trajectories drawing
    Sample,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Fit => write!(f, "fit"),
            Stage::Predict => write!(f, "predict"),
            Stage::Sample => write!(f, "sample"),
        }
    }
}

/// An error when using [`GaussianProcess`](crate::GaussianProcess) or its components
#[derive(Error, Debug)]
pub enum GpError {
    /// When a hyperparameter or an option has a bad value
    #[error("InvalidParameter error: {0}")]
    InvalidParameter(String),
    /// When data cannot be rescaled (zero variance, not enough points)
    #[error("DegenerateInput error: {0}")]
    DegenerateInput(String),
    /// When Cholesky factorization of a covariance matrix fails
    #[error("NotPositiveDefinite error: {0}")]
    NotPositiveDefinite(String),
    /// When every restart of the hyperparameter optimization failed
    #[error("FitFailure error: {0}")]
    FitFailure(String),
    /// When a posterior covariance matrix has significantly negative eigenvalues
    #[error("InvalidCovariance error: {0}")]
    InvalidCovariance(String),
    /// When array lengths or dimensions are inconsistent
    #[error("ShapeMismatch error: {0}")]
    ShapeMismatch(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When an error occurs within a public operation
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// Operation which failed
        stage: Stage,
        /// Underlying error
        source: Box<GpError>,
    },
    /// When error during saving
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveError(#[from] serde_json::Error),
    /// When error during loading
    #[cfg(feature = "persistent")]
    #[error("Load IO error")]
    LoadIoError(#[from] std::io::Error),
}

impl GpError {
    /// Tag the error with the stage it occurred in.
    /// An error already tagged keeps its original stage.
    pub fn during(self, stage: Stage) -> GpError {
        match self {
            GpError::Stage { .. } => self,
            err => GpError::Stage {
                stage,
                source: Box::new(err),
            },
        }
    }

    /// Stage the error was raised in if known
    pub fn stage(&self) -> Option<Stage> {
        match self {
            GpError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Underlying error, stripped from its stage tag
    pub fn root(&self) -> &GpError {
        match self {
            GpError::Stage { source, .. } => source.root(),
            err => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tagging_is_idempotent() {
        let err = GpError::DegenerateInput("all y equal".to_string())
            .during(Stage::Fit)
            .during(Stage::Predict);
        assert_eq!(Some(Stage::Fit), err.stage());
        assert!(matches!(err.root(), GpError::DegenerateInput(_)));
        assert_eq!(
            "fit stage failed: DegenerateInput error: all y equal",
            err.to_string()
        );
    }
}
