use crate::errors::{GpError, Result};
use linfa::Float;
use ndarray::{s, Array1, Array2, ArrayBase, Data, Ix1, Ix2};

/// A structure to retain differences between training points used to build covariance matrix
#[derive(Debug, Clone)]
pub struct DiffMatrix<F: Float> {
    /// Differences as (n_obs * (n_obs-1))/2, nx) array
    pub d: Array2<F>,
    /// Indices of the differences in the original data array
    pub d_indices: Array2<usize>,
    /// Number of observations
    pub n_obs: usize,
}

impl<F: Float> DiffMatrix<F> {
    /// Compute differences given points given as an array (n_obs, nx)
    pub fn new(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> DiffMatrix<F> {
        let (d, d_indices) = Self::cross_diff(x);
        let n_obs = x.nrows();

        DiffMatrix {
            d,
            d_indices,
            n_obs,
        }
    }

    fn cross_diff(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> (Array2<F>, Array2<usize>) {
        let n_obs = x.nrows();
        let nx = x.ncols();
        let n_non_zero_cross_dist = n_obs * n_obs.saturating_sub(1) / 2;
        let mut indices = Array2::<usize>::zeros((n_non_zero_cross_dist, 2));
        let mut d = Array2::zeros((n_non_zero_cross_dist, nx));
        let mut idx = 0;
        for k in 0..n_obs.saturating_sub(1) {
            let idx0 = idx;
            let offset = n_obs - k - 1;
            idx = idx0 + offset;

            for i in (k + 1)..n_obs {
                let r = idx0 + i - k - 1;
                indices[[r, 0]] = k;
                indices[[r, 1]] = i;
            }

            let diff = &x.slice(s![k, ..]) - &x.slice(s![k + 1..n_obs, ..]);
            d.slice_mut(s![idx0..idx, ..]).assign(&diff);
        }

        (d, indices)
    }

    /// Squared euclidean norm of each difference row
    pub fn sq_norms(&self) -> Array1<F> {
        self.d
            .rows()
            .into_iter()
            .map(|row| row.dot(&row))
            .collect()
    }
}

/// Computes differences between each element of x and each element of y
/// resulting in a 2d array of shape (nrows(x) * nrows(y), ncols(x));
/// *Panics* if x and y have not the same column numbers
pub fn pairwise_differences<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.ncols() == y.ncols());

    let nx = x.nrows();
    let ny = y.nrows();
    let ncols = x.ncols();
    let mut result = Array2::zeros((nx * ny, ncols));

    for (i, x_row) in x.rows().into_iter().enumerate() {
        for (j, y_row) in y.rows().into_iter().enumerate() {
            let idx = i * ny + j;
            for k in 0..ncols {
                result[[idx, k]] = x_row[k] - y_row[k];
            }
        }
    }

    result
}

/// Check that points sets share the same number of components
pub(crate) fn check_same_dims<F: Float>(
    x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
    x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<()> {
    if x1.ncols() != x2.ncols() {
        return Err(GpError::ShapeMismatch(format!(
            "points dimension mismatch: {} vs {}",
            x1.ncols(),
            x2.ncols()
        )));
    }
    Ok(())
}

/// Check that a vector has the expected length
pub(crate) fn check_len<F: Float>(
    name: &str,
    v: &ArrayBase<impl Data<Elem = F>, Ix1>,
    expected: usize,
) -> Result<()> {
    if v.len() != expected {
        return Err(GpError::ShapeMismatch(format!(
            "`{name}` length should be {expected}, got {}",
            v.len()
        )));
    }
    Ok(())
}

/// Conversion to f64 used at optimizer boundaries
#[inline(always)]
pub(crate) fn into_f64<F: Float>(v: F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pairwise_differences() {
        let x = array![[-0.9486833], [-0.82219219]];
        let y = array![[-1.26491106], [0.], [1.26491106]];
        assert_abs_diff_eq!(
            &array![
                [0.31622777],
                [-0.9486833],
                [-2.21359436],
                [0.44271887],
                [-0.82219219],
                [-2.08710326]
            ],
            &pairwise_differences(&x, &y),
            epsilon = 1e-6
        )
    }

    #[test]
    fn test_diff_matrix() {
        let xt = array![[0.5], [1.2], [2.0], [3.0]];
        let dm = DiffMatrix::new(&xt);
        assert_abs_diff_eq!(
            array![[-0.7], [-1.5], [-2.5], [-0.8], [-1.8], [-1.]],
            dm.d,
            epsilon = 1e-12
        );
        assert_eq!(
            array![[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]],
            dm.d_indices
        );
        assert_abs_diff_eq!(
            array![0.49, 2.25, 6.25, 0.64, 3.24, 1.],
            dm.sq_norms(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_diff_matrix_single_point() {
        let dm = DiffMatrix::new(&array![[1., 2.]]);
        assert_eq!(0, dm.d.nrows());
        assert_eq!(2, dm.d.ncols());
        assert_eq!(1, dm.n_obs);
    }

    #[test]
    fn test_check_same_dims() {
        let x1 = array![[1., 2.]];
        let x2 = array![[1.], [2.]];
        assert!(matches!(
            check_same_dims(&x1, &x2),
            Err(GpError::ShapeMismatch(_))
        ));
        assert!(check_same_dims(&x1, &x1).is_ok());
    }
}
