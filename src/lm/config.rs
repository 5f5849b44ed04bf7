//! Configuration options for the Levenberg-Marquardt algorithm.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of iterations. Default: 200
    pub max_iterations: usize,

    /// Relative tolerance on the decrease of the cost. Default: 1e-10
    pub ftol: f64,

    /// Relative tolerance on the step length. Default: 1e-10
    pub xtol: f64,

    /// Tolerance on the infinity norm of the gradient. Default: 1e-12
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e12
    pub max_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e12,
        }
    }
}

impl LmConfig {
    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("ftol", self.ftol),
            ("xtol", self.xtol),
            ("initial_lambda", self.initial_lambda),
            ("min_lambda", self.min_lambda),
        ];
        for (name, value) in positive {
            if !(value > 0.0 && value.is_finite()) {
                return Err(FitError::InvalidConfig(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        if !(self.gtol >= 0.0) {
            return Err(FitError::InvalidConfig(format!(
                "gtol must be non-negative, got {}",
                self.gtol
            )));
        }
        if self.max_iterations == 0 {
            return Err(FitError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        let down_ok = self.lambda_down_factor > 0.0 && self.lambda_down_factor < 1.0;
        if !(self.lambda_up_factor > 1.0) || !down_ok {
            return Err(FitError::InvalidConfig(
                "lambda_up_factor must exceed 1 and lambda_down_factor must lie in (0, 1)"
                    .to_string(),
            ));
        }
        if !(self.max_lambda > self.min_lambda) {
            return Err(FitError::InvalidConfig(format!(
                "max_lambda ({}) must exceed min_lambda ({})",
                self.max_lambda, self.min_lambda
            )));
        }
        Ok(())
    }
}
