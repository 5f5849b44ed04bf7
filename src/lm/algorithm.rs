//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core implementation of the Levenberg-Marquardt algorithm
//! for nonlinear least-squares optimization. Each iteration solves the damped
//! normal equations `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` and accepts the step when
//! the actual cost reduction agrees well enough with the predicted one.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{FitError, Result};
use crate::problem::Problem;
use crate::result::Status;
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

use super::config::LmConfig;
use super::trust_region::TrustRegion;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of residual evaluations
    pub func_evals: usize,

    /// Why the solver stopped
    pub status: Status,

    /// A message describing the result
    pub message: String,

    /// The Jacobian matrix at the solution
    pub jacobian: Option<Array2<f64>>,
}

impl LmResult {
    /// Whether the optimization converged.
    pub fn success(&self) -> bool {
        self.status.is_success()
    }
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params.to_vec())?;
        Ok(())
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in residual norm.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Minimize the sum of squared residuals for the given problem.
    ///
    /// Errors are returned only for invalid configuration, dimension
    /// mismatches and failed residual evaluations; running out of iterations
    /// or damping is reported through [`LmResult::status`].
    pub fn minimize<P: Problem + ?Sized>(
        &self,
        problem: &P,
        initial_params: Array1<f64>,
    ) -> Result<LmResult> {
        self.config.validate()?;

        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let mut params = initial_params;
        let mut residuals = problem.eval(&params)?;
        if residuals.len() != problem.residual_count() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                problem.residual_count(),
                residuals.len()
            )));
        }
        let mut cost = sum_of_squares(&residuals);
        let mut func_evals = 1;
        let mut trust_region = TrustRegion::from_config(&self.config);
        let mut jacobian = problem.jacobian(&params)?;

        let finish = |params: Array1<f64>,
                      residuals: Array1<f64>,
                      cost: f64,
                      iterations: usize,
                      func_evals: usize,
                      jacobian: Array2<f64>,
                      status: Status,
                      message: String| {
            log::debug!(
                "levenberg-marquardt: {} after {} iterations ({})",
                status,
                iterations,
                message
            );
            LmResult {
                params,
                residuals,
                cost,
                iterations,
                func_evals,
                status,
                message,
                jacobian: Some(jacobian),
            }
        };

        for iteration in 0..self.config.max_iterations {
            if cost == 0.0 {
                return Ok(finish(
                    params,
                    residuals,
                    cost,
                    iteration,
                    func_evals,
                    jacobian,
                    Status::Converged,
                    "Residuals are exactly zero".to_string(),
                ));
            }

            let j = ndarray_to_nalgebra(&jacobian);
            let r = ndarray_vec_to_nalgebra(&residuals);
            let jtj = j.transpose() * &j;
            let g = j.transpose() * &r;

            let gradient_norm = g.amax();
            if gradient_norm <= self.config.gtol {
                return Ok(finish(
                    params,
                    residuals,
                    cost,
                    iteration,
                    func_evals,
                    jacobian,
                    Status::Converged,
                    format!(
                        "Gradient convergence: ||g|| = {:.2e} <= {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                ));
            }

            // Retry with increasing damping until a step is accepted
            loop {
                let step = match solve_damped(&jtj, &g, trust_region.lambda) {
                    Some(step) => step,
                    None => {
                        trust_region.increase();
                        if trust_region.exhausted() {
                            return Ok(finish(
                                params,
                                residuals,
                                cost,
                                iteration,
                                func_evals,
                                jacobian,
                                Status::Stalled,
                                "Failed to calculate step, and lambda reached maximum".to_string(),
                            ));
                        }
                        continue;
                    }
                };

                // ||r + Jδ||² = ||r||² + 2δᵀg + δᵀJᵀJδ
                let predicted_reduction = -(2.0 * step.dot(&g) + step.dot(&(&jtj * &step)));
                let step_nd = nalgebra_vec_to_ndarray(&step);
                let new_params = &params + &step_nd;
                func_evals += 1;
                // A step that leaves the model's domain is a rejected step
                let (new_residuals, new_cost) = match problem.eval(&new_params) {
                    Ok(r) => {
                        let c = sum_of_squares(&r);
                        (r, c)
                    }
                    Err(FitError::ModelEvaluation(msg)) => {
                        log::trace!("lm iteration {}: rejecting step: {}", iteration, msg);
                        (Array1::zeros(0), f64::INFINITY)
                    }
                    Err(e) => return Err(e),
                };

                let rho = TrustRegion::gain_ratio(cost, new_cost, predicted_reduction);
                log::trace!(
                    "lm iteration {}: lambda = {:.3e}, cost = {:.6e} -> {:.6e}, rho = {:.3}",
                    iteration,
                    trust_region.lambda,
                    cost,
                    new_cost,
                    rho
                );

                if new_cost.is_finite() && trust_region.update_lambda(rho) {
                    let step_norm = step.norm();
                    let param_norm = params.iter().map(|p| p * p).sum::<f64>().sqrt();
                    let actual_reduction = cost - new_cost;

                    let step_tol = self.config.xtol * (self.config.xtol + param_norm);
                    let converged = if step_norm <= step_tol {
                        Some(format!(
                            "Parameter convergence: |dx| = {:.2e} <= xtol * |x|",
                            step_norm
                        ))
                    } else if actual_reduction <= self.config.ftol * cost {
                        Some(format!(
                            "Cost convergence: df/f = {:.2e} <= {:.2e}",
                            actual_reduction / cost,
                            self.config.ftol
                        ))
                    } else {
                        None
                    };

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    jacobian = problem.jacobian(&params)?;

                    if let Some(message) = converged {
                        return Ok(finish(
                            params,
                            residuals,
                            cost,
                            iteration + 1,
                            func_evals,
                            jacobian,
                            Status::Converged,
                            message,
                        ));
                    }
                    break;
                }

                if !new_cost.is_finite() {
                    trust_region.increase();
                }

                // Nothing left to gain according to the local model
                if new_cost.is_finite()
                    && predicted_reduction <= self.config.ftol * cost
                    && (cost - new_cost).abs() <= self.config.ftol * cost
                {
                    return Ok(finish(
                        params,
                        residuals,
                        cost,
                        iteration + 1,
                        func_evals,
                        jacobian,
                        Status::Converged,
                        format!(
                            "Predicted reduction {:.2e} below ftol * cost",
                            predicted_reduction
                        ),
                    ));
                }

                if trust_region.exhausted() {
                    return Ok(finish(
                        params,
                        residuals,
                        cost,
                        iteration + 1,
                        func_evals,
                        jacobian,
                        Status::Stalled,
                        "Failed to decrease cost, and lambda reached maximum".to_string(),
                    ));
                }
            }
        }

        log::warn!(
            "levenberg-marquardt stopped after {} iterations without converging",
            self.config.max_iterations
        );
        let iterations = self.config.max_iterations;
        Ok(finish(
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            jacobian,
            Status::MaxIterations,
            format!("Maximum iterations ({}) reached", iterations),
        ))
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r.powi(2)).sum()
}

/// Solve `(JᵀJ + λ·D) δ = -g` with `D` the (floored) diagonal of `JᵀJ`.
///
/// Cholesky first, SVD least squares when the damped matrix is not positive
/// definite. Returns `None` if neither yields a finite step.
fn solve_damped(jtj: &DMatrix<f64>, g: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let n = jtj.nrows();
    let mut a = jtj.clone();
    for i in 0..n {
        a[(i, i)] += lambda * jtj[(i, i)].max(f64::EPSILON);
    }
    let rhs = g.map(|v| -v);

    let step = match a.clone().cholesky() {
        Some(cholesky) => cholesky.solve(&rhs),
        None => a.svd(true, true).solve(&rhs, 1e-14).ok()?,
    };

    if step.iter().all(|v| v.is_finite()) {
        Some(step)
    } else {
        None
    }
}
