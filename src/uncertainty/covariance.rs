//! # Covariance Matrix Calculations
//!
//! This module provides functions for calculating and manipulating covariance
//! matrices from Jacobian matrices in nonlinear least-squares optimization.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Relative singular value below which `J^T J` is treated as rank deficient.
const RANK_TOLERANCE: f64 = 1e-14;

/// Calculate covariance matrix from Jacobian matrix.
///
/// For nonlinear least-squares problems, the covariance matrix is estimated as:
///   covar = scale * inv(J^T * J)
/// where `scale` is the reduced chi-square `SSR / (n - p)` for relative
/// weights, or `1.0` when the residuals are already scaled by absolute
/// uncertainties.
///
/// `J^T * J` is inverted by Cholesky; if that fails the SVD pseudo-inverse is
/// used as long as the matrix has full numerical rank. Fails with
/// [`FitError::LinearAlgebra`] when it is rank deficient (for example when a
/// parameter has no effect on the model).
pub fn calculate_covariance(jacobian: &Array2<f64>, scale: f64) -> Result<Array2<f64>> {
    let j = ndarray_to_nalgebra(jacobian);
    let jtj = j.transpose() * &j;

    let inverse = match jtj.clone().cholesky() {
        Some(cholesky) => cholesky.inverse(),
        None => {
            let svd = jtj.svd(true, true);
            let max_sv = svd.singular_values.max();
            let min_sv = svd.singular_values.min();
            if !(max_sv > 0.0) || min_sv <= RANK_TOLERANCE * max_sv {
                return Err(FitError::LinearAlgebra("J^T J is singular".to_string()));
            }
            svd.pseudo_inverse(0.0)
                .map_err(|e| FitError::LinearAlgebra(e.to_string()))?
        }
    };
    let inverse = inverse * scale;

    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(FitError::LinearAlgebra(
            "covariance contains non-finite entries".to_string(),
        ));
    }

    Ok(nalgebra_to_ndarray(&inverse))
}

/// Calculate correlation matrix from covariance matrix.
///
/// The correlation matrix is calculated as:
///   correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
///
/// Off-diagonal entries whose variances are zero or not finite are set to 0.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut correl = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..n {
            if i == j {
                correl[[i, j]] = 1.0;
            } else {
                let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
                if denom > 0.0 && denom.is_finite() {
                    correl[[i, j]] = covar[[i, j]] / denom;
                }
            }
        }
    }

    correl
}

/// Extract standard errors from the covariance matrix.
///
/// Standard errors are the square roots of the diagonal elements
/// of the covariance matrix; an infinite variance gives an infinite error.
/// A negative or NaN variance gives NaN, with a warning.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    let errors = covar.diag().mapv(|v| if v >= 0.0 { v.sqrt() } else { f64::NAN });
    if errors.iter().any(|e| e.is_nan()) {
        log::warn!(
            "covariance has negative or NaN variances {:?}; standard errors are NaN there",
            covar.diag().to_vec()
        );
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::arr2;

    #[test]
    fn test_calculate_covariance() {
        // 2 parameters, 3 data points
        let jacobian = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

        let covar = calculate_covariance(&jacobian, 2.0).unwrap();
        assert_eq!(covar.shape(), &[2, 2]);

        // J^T J = [[35, 44], [44, 56]], det = 24
        assert_relative_eq!(covar[[0, 0]], 2.0 * 56.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[1, 1]], 2.0 * 35.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[0, 1]], -2.0 * 44.0 / 24.0, epsilon = 1e-10);
        assert_relative_eq!(covar[[0, 1]], covar[[1, 0]], epsilon = 1e-12);
    }

    #[test]
    fn test_singular_jacobian() {
        // Second column has no effect
        let jacobian = arr2(&[[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);
        assert!(matches!(
            calculate_covariance(&jacobian, 1.0),
            Err(FitError::LinearAlgebra(_))
        ));
    }

    #[test]
    fn test_calculate_correlation() {
        let covar = arr2(&[[0.1, 0.05], [0.05, 0.2]]);

        let correl = calculate_correlation(&covar);

        assert_eq!(correl[[0, 0]], 1.0);
        assert_eq!(correl[[1, 1]], 1.0);
        let expected = 0.05 / (0.1f64 * 0.2f64).sqrt();
        assert_relative_eq!(correl[[0, 1]], expected, epsilon = 1e-10);
        assert_relative_eq!(correl[[1, 0]], expected, epsilon = 1e-10);
    }

    #[test]
    fn test_standard_errors_from_covariance() {
        let covar = arr2(&[[0.1, 0.05], [0.05, f64::INFINITY]]);

        let errors = standard_errors_from_covariance(&covar);

        assert_eq!(errors.len(), 2);
        assert_relative_eq!(errors[0], 0.1f64.sqrt(), epsilon = 1e-12);
        assert!(errors[1].is_infinite());
    }

    #[test]
    fn test_invalid_variances_are_not_certain() {
        let covar = arr2(&[[-1e-3, 0.0, 0.0], [0.0, f64::NAN, 0.0], [0.0, 0.0, 0.0]]);

        let errors = standard_errors_from_covariance(&covar);

        assert!(errors[0].is_nan());
        assert!(errors[1].is_nan());
        assert_eq!(errors[2], 0.0);
    }
}
