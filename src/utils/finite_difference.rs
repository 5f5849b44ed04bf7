//! Finite difference methods for numerical differentiation.
//!
//! This module provides functions for computing Jacobians of vector-valued
//! functions and gradients of scalar objectives using finite difference
//! approximations.

use crate::bounds::PairBounds;
use crate::error::{FitError, Result};
use ndarray::{Array1, Array2};

/// Default relative step size for forward differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// Default relative step size for central differences.
const CENTRAL_EPSILON: f64 = 1e-7;

/// Step for parameter `value`, scaled to its magnitude.
fn step_for(value: f64, eps: f64) -> f64 {
    if value.abs() > 1.0 {
        value.abs() * eps
    } else {
        eps
    }
}

/// Compute the Jacobian matrix of `f` using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the outputs with
/// respect to the parameters: J[i,j] = ∂f[i]/∂param[j].
///
/// # Arguments
///
/// * `f` - The vector-valued function to differentiate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The step size for finite differences (optional)
pub fn jacobian<F>(f: F, params: &Array1<f64>, epsilon: Option<f64>) -> Result<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Result<Array1<f64>>,
{
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_params = params.len();

    let values = f(params)?;
    let n_values = values.len();

    let mut jac = Array2::zeros((n_values, n_params));

    for j in 0..n_params {
        let mut params_perturbed = params.clone();
        let eps_j = step_for(params[j], eps);
        params_perturbed[j] += eps_j;

        let values_perturbed = f(&params_perturbed)?;
        if values_perturbed.len() != n_values {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} values, got {}",
                n_values,
                values_perturbed.len()
            )));
        }

        for i in 0..n_values {
            jac[[i, j]] = (values_perturbed[i] - values[i]) / eps_j;
        }
    }

    Ok(jac)
}

/// Compute the gradient of a scalar function using central finite differences.
///
/// When `bounds` is given, a coordinate whose central stencil would leave its
/// interval falls back to a one-sided difference taken inside the box, so the
/// function is never evaluated outside the feasible region.
///
/// # Arguments
///
/// * `f` - The function to differentiate
/// * `params` - The parameter values at which to evaluate the gradient
/// * `bounds` - Optional box the stencil must stay inside
/// * `epsilon` - The step size for finite differences (optional)
pub fn gradient<F>(
    f: F,
    params: &Array1<f64>,
    bounds: Option<&PairBounds>,
    epsilon: Option<f64>,
) -> Result<Array1<f64>>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let eps = epsilon.unwrap_or(CENTRAL_EPSILON);
    let n_params = params.len();
    let mut grad = Array1::zeros(n_params);
    let mut f0: Option<f64> = None;

    for j in 0..n_params {
        let h = step_for(params[j], eps);
        let (lo, hi) = bounds
            .map(|b| b.pairs()[j])
            .unwrap_or((f64::NEG_INFINITY, f64::INFINITY));

        let can_forward = params[j] + h <= hi;
        let can_backward = params[j] - h >= lo;

        let mut forward = params.clone();
        let mut backward = params.clone();

        grad[j] = if can_forward && can_backward {
            forward[j] += h;
            backward[j] -= h;
            (f(&forward)? - f(&backward)?) / (2.0 * h)
        } else {
            let center = match f0 {
                Some(value) => value,
                None => {
                    let value = f(params)?;
                    f0 = Some(value);
                    value
                }
            };
            if can_forward {
                forward[j] += h;
                (f(&forward)? - center) / h
            } else if can_backward {
                backward[j] -= h;
                (center - f(&backward)?) / h
            } else {
                // Interval narrower than the step: the coordinate is pinned
                0.0
            }
        };
    }

    Ok(grad)
}
