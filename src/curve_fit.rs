//! Nonlinear least-squares curve fitting.
//!
//! [`curve_fit`] fits a [`RateModel`] directly to a [`Dataset`] with the
//! Levenberg-Marquardt solver and estimates the parameter covariance from the
//! Jacobian at the solution. Bounds use the curve-fit convention
//! ([`CurveFitBounds`]: all lowers, then all uppers) and are enforced through
//! the Minuit-style transform, so the solver itself runs unconstrained.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bounds::{BoundsTransform, CurveFitBounds};
use crate::data::Dataset;
use crate::error::{FitError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::model::RateModel;
use crate::problem::Problem;
use crate::result::Status;
use crate::uncertainty::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance,
};

/// Internal offset applied when a start value sits exactly on a bound, where
/// the transform is stationary and the solver would never move it.
const BOUNDARY_NUDGE: f64 = 1e-2;

/// Options for [`curve_fit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveFitOptions {
    /// Per-observation standard deviations; residuals are divided by them.
    pub sigma: Option<Vec<f64>>,

    /// Treat `sigma` as absolute uncertainties (covariance is not rescaled
    /// by the reduced chi-square).
    pub absolute_sigma: bool,

    /// Solver settings.
    pub lm: LmConfig,
}

impl CurveFitOptions {
    pub fn with_sigma(mut self, sigma: Vec<f64>) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn with_absolute_sigma(mut self, absolute_sigma: bool) -> Self {
        self.absolute_sigma = absolute_sigma;
        self
    }

    pub fn with_lm_config(mut self, lm: LmConfig) -> Self {
        self.lm = lm;
        self
    }
}

/// Result of [`curve_fit`].
#[derive(Debug, Clone)]
pub struct CurveFitResult {
    /// Fitted parameters, in model order
    pub params: Array1<f64>,

    /// Estimated parameter covariance; filled with infinity when it cannot
    /// be estimated
    pub covariance: Array2<f64>,

    /// Weighted sum of squared residuals at `params`
    pub cost: f64,

    /// Unweighted residuals `model(x) - y` at `params`
    pub residuals: Array1<f64>,

    /// Why the solver stopped
    pub status: Status,

    /// A message describing the result
    pub message: String,

    /// Number of solver iterations
    pub nit: usize,

    /// Number of residual evaluations
    pub nfev: usize,
}

impl CurveFitResult {
    pub fn success(&self) -> bool {
        self.status.is_success()
    }

    /// One-sigma parameter uncertainties.
    pub fn std_errors(&self) -> Array1<f64> {
        standard_errors_from_covariance(&self.covariance)
    }

    /// Parameter correlation matrix.
    pub fn correlation(&self) -> Array2<f64> {
        calculate_correlation(&self.covariance)
    }

    fn infeasible(p0: &Array1<f64>, message: String) -> Self {
        log::warn!("{}", message);
        let n = p0.len();
        Self {
            params: p0.clone(),
            covariance: Array2::from_elem((n, n), f64::INFINITY),
            cost: f64::INFINITY,
            residuals: Array1::zeros(0),
            status: Status::BoundsInfeasible,
            message,
            nit: 0,
            nfev: 0,
        }
    }
}

impl fmt::Display for CurveFitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Curve Fit Result:")?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        let errors = self.std_errors();
        for (i, (p, e)) in self.params.iter().zip(errors.iter()).enumerate() {
            writeln!(f, "  p[{}] = {:.6e} +/- {:.3e}", i, p, e)?;
        }
        Ok(())
    }
}

/// Residual problem in the solver's unbounded coordinates.
struct TransformedProblem<'a, M: ?Sized> {
    model: &'a M,
    data: &'a Dataset,
    transforms: Vec<BoundsTransform>,
    weights: Option<Array1<f64>>,
}

impl<'a, M: RateModel + ?Sized> TransformedProblem<'a, M> {
    fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            internal
                .iter()
                .zip(self.transforms.iter())
                .map(|(&v, t)| t.to_external(v)),
        )
    }

    /// Residuals (weighted when sigma is given) at external parameters.
    fn external_residuals(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let predicted = self.model.eval(self.data.x(), params)?;
        let residuals = predicted - self.data.y();
        Ok(match &self.weights {
            Some(w) => residuals * w,
            None => residuals,
        })
    }

    /// Jacobian of the (weighted) residuals at external parameters.
    fn external_jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let mut jac = self.model.jacobian(self.data.x(), params)?;
        if let Some(w) = &self.weights {
            for (mut row, &wi) in jac.rows_mut().into_iter().zip(w.iter()) {
                row *= wi;
            }
        }
        Ok(jac)
    }
}

impl<'a, M: RateModel + ?Sized> Problem for TransformedProblem<'a, M> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.external_residuals(&self.to_external(params))
    }

    fn parameter_count(&self) -> usize {
        self.transforms.len()
    }

    fn residual_count(&self) -> usize {
        self.data.len()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        // Chain rule through the bounds transform
        let mut jac = self.external_jacobian(&self.to_external(params))?;
        for (mut column, (&v, t)) in jac
            .columns_mut()
            .into_iter()
            .zip(params.iter().zip(self.transforms.iter()))
        {
            column *= t.derivative(v);
        }
        Ok(jac)
    }
}

/// Fit `model` to `data` by nonlinear least squares.
///
/// # Arguments
///
/// * `model` - The model to fit
/// * `data` - Observations
/// * `p0` - Initial guess, in model parameter order
/// * `bounds` - Bounds in the curve-fit convention (`lower`, `upper`)
/// * `options` - Weights and solver settings
///
/// # Returns
///
/// Dimension mismatches and invalid weights fail immediately. A start point
/// outside `bounds` yields a result with [`Status::BoundsInfeasible`] and
/// infinite covariance; solver non-convergence is reported through
/// [`CurveFitResult::status`].
pub fn curve_fit<M: RateModel + ?Sized>(
    model: &M,
    data: &Dataset,
    p0: &Array1<f64>,
    bounds: &CurveFitBounds,
    options: &CurveFitOptions,
) -> Result<CurveFitResult> {
    let n_params = model.param_count();
    if p0.len() != n_params {
        return Err(FitError::DimensionMismatch(format!(
            "Initial guess has {} entries but the model has {} parameters",
            p0.len(),
            n_params
        )));
    }
    if bounds.lower().len() != n_params || bounds.upper().len() != n_params {
        return Err(FitError::DimensionMismatch(format!(
            "Bounds have {} lower and {} upper entries for {} parameters",
            bounds.lower().len(),
            bounds.upper().len(),
            n_params
        )));
    }

    let weights = match &options.sigma {
        Some(sigma) => {
            if sigma.len() != data.len() {
                return Err(FitError::DimensionMismatch(format!(
                    "sigma has {} entries for {} observations",
                    sigma.len(),
                    data.len()
                )));
            }
            if let Some(bad) = sigma.iter().find(|s| !(**s > 0.0 && s.is_finite())) {
                return Err(FitError::InvalidInput(format!(
                    "sigma entries must be positive and finite, got {}",
                    bad
                )));
            }
            Some(Array1::from_iter(sigma.iter().map(|s| 1.0 / s)))
        }
        None => None,
    };

    let p0_slice = p0.to_vec();
    if let Some(err) = bounds.to_pairs().infeasibility(&p0_slice) {
        return Ok(CurveFitResult::infeasible(
            p0,
            format!("Initial guess is infeasible: {}", err),
        ));
    }

    let transforms: Vec<BoundsTransform> = bounds
        .intervals()
        .into_iter()
        .map(BoundsTransform::new)
        .collect();

    let mut internal = Array1::zeros(n_params);
    for (i, t) in transforms.iter().enumerate() {
        let mut value = t.to_internal(p0[i])?;
        if t.derivative(value).abs() < 1e-8 {
            value -= BOUNDARY_NUDGE * value.signum();
        }
        internal[i] = value;
    }

    let problem = TransformedProblem {
        model,
        data,
        transforms,
        weights,
    };

    let lm = LevenbergMarquardt::with_config(options.lm.clone());
    let solution = lm.minimize(&problem, internal)?;
    let params = problem.to_external(&solution.params);

    if !solution.success() {
        log::warn!("curve_fit did not converge: {}", solution.message);
    }

    let n_obs = data.len();
    let covariance = if n_obs <= n_params {
        log::warn!(
            "covariance cannot be estimated with {} observations for {} parameters",
            n_obs,
            n_params
        );
        Array2::from_elem((n_params, n_params), f64::INFINITY)
    } else {
        let scale = if options.absolute_sigma && options.sigma.is_some() {
            1.0
        } else {
            solution.cost / (n_obs - n_params) as f64
        };
        let jacobian = problem.external_jacobian(&params)?;
        match calculate_covariance(&jacobian, scale) {
            Ok(covariance) => covariance,
            Err(e) => {
                log::warn!("covariance of the parameters could not be estimated: {}", e);
                Array2::from_elem((n_params, n_params), f64::INFINITY)
            }
        }
    };

    let residuals = model.eval(data.x(), &params)? - data.y();
    log::debug!(
        "curve_fit: params = {:?}, cost = {:.6e}, status = {}",
        params.to_vec(),
        solution.cost,
        solution.status
    );

    Ok(CurveFitResult {
        params,
        covariance,
        cost: solution.cost,
        residuals,
        status: solution.status,
        message: solution.message,
        nit: solution.iterations,
        nfev: solution.func_evals,
    })
}
