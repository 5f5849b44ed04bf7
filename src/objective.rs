//! Scalar objectives built from a model and a dataset.
//!
//! An objective reduces the residuals of a model against a [`Dataset`] to a
//! single non-negative number. Objectives borrow their dataset and never
//! mutate anything, so the same objective can be evaluated from many threads.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::Dataset;
use crate::error::{FitError, Result};
use crate::model::RateModel;

/// Reduction applied to the residuals `model(x_i) - y_i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    /// Σ r², the Gaussian maximum-likelihood loss (conditional mean).
    #[default]
    SumOfSquares,

    /// Σ |r|, robust to outliers (conditional median).
    SumOfAbsolute,
}

impl Loss {
    /// Reduce a residual vector.
    pub fn reduce(&self, residuals: &Array1<f64>) -> f64 {
        match self {
            Loss::SumOfSquares => residuals.iter().map(|r| r * r).sum(),
            Loss::SumOfAbsolute => residuals.iter().map(|r| r.abs()).sum(),
        }
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loss::SumOfSquares => write!(f, "sum of squares"),
            Loss::SumOfAbsolute => write!(f, "sum of absolute deviations"),
        }
    }
}

/// What to do when the model produces a NaN or infinite prediction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum NonFinitePolicy {
    /// Return [`FitError::ModelEvaluation`].
    #[default]
    Propagate,

    /// Report this (finite) loss instead.
    Penalty(f64),
}

/// A scalar function of a parameter vector to be minimized.
pub trait Objective: Sync {
    /// Number of parameters the objective expects.
    fn dim(&self) -> usize;

    /// Evaluate the objective at `params`.
    fn value(&self, params: &Array1<f64>) -> Result<f64>;
}

impl<T: Objective + ?Sized> Objective for &T {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn value(&self, params: &Array1<f64>) -> Result<f64> {
        (**self).value(params)
    }
}

/// Evaluate `objective` and reject non-finite values.
///
/// Used by the minimizers on every evaluation so that a NaN from a user closure
/// can never be mistaken for a valid loss.
pub(crate) fn checked_value<O: Objective + ?Sized>(
    objective: &O,
    params: &Array1<f64>,
) -> Result<f64> {
    let value = objective.value(params)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FitError::ModelEvaluation(format!(
            "objective returned {} at {:?}",
            value,
            params.as_slice().unwrap_or(&[])
        )))
    }
}

/// Evaluate a trial point proposed by a solver.
///
/// A point outside the model's domain scores `+inf` so the solver rejects
/// it like any other poor step. Errors other than
/// [`FitError::ModelEvaluation`] still propagate.
pub(crate) fn trial_value<O: Objective + ?Sized>(
    objective: &O,
    params: &Array1<f64>,
) -> Result<f64> {
    match checked_value(objective, params) {
        Err(FitError::ModelEvaluation(msg)) => {
            log::trace!("rejecting trial point: {}", msg);
            Ok(f64::INFINITY)
        }
        other => other,
    }
}

/// Loss of a [`RateModel`] against a borrowed [`Dataset`].
#[derive(Debug, Clone, Copy)]
pub struct ModelObjective<'a, M: ?Sized> {
    model: &'a M,
    data: &'a Dataset,
    loss: Loss,
    policy: NonFinitePolicy,
}

impl<'a, M: RateModel + ?Sized> ModelObjective<'a, M> {
    pub fn new(model: &'a M, data: &'a Dataset, loss: Loss) -> Self {
        Self {
            model,
            data,
            loss,
            policy: NonFinitePolicy::Propagate,
        }
    }

    /// Replace the non-finite handling policy.
    pub fn with_policy(mut self, policy: NonFinitePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn loss(&self) -> Loss {
        self.loss
    }

    pub fn data(&self) -> &Dataset {
        self.data
    }

    /// Residuals `model(x_i, params) - y_i`.
    pub fn residuals(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let predicted = self.model.eval(self.data.x(), params)?;
        Ok(predicted - self.data.y())
    }
}

impl<'a, M: RateModel + ?Sized> Objective for ModelObjective<'a, M> {
    fn dim(&self) -> usize {
        self.model.param_count()
    }

    fn value(&self, params: &Array1<f64>) -> Result<f64> {
        match self.residuals(params) {
            Ok(residuals) => Ok(self.loss.reduce(&residuals)),
            Err(FitError::ModelEvaluation(msg)) => match self.policy {
                NonFinitePolicy::Propagate => Err(FitError::ModelEvaluation(msg)),
                NonFinitePolicy::Penalty(penalty) => {
                    log::trace!("substituting penalty {} for: {}", penalty, msg);
                    Ok(penalty)
                }
            },
            Err(e) => Err(e),
        }
    }
}

/// An objective given as a closure plus the auxiliary argument it is called with.
///
/// This mirrors the `objective(params, *args)` convention: the closure gets
/// the candidate parameters and a shared reference to `args` on every call.
///
/// ```
/// use mmfit_rs::objective::{FnObjective, Objective};
/// use ndarray::array;
///
/// let offsets = vec![1.0, 2.0];
/// let objective = FnObjective::new(2, |p, c: &Vec<f64>| {
///     Ok((p[0] - c[0]).powi(2) + (p[1] - c[1]).powi(2))
/// }, offsets);
/// assert_eq!(objective.value(&array![1.0, 2.0]).unwrap(), 0.0);
/// ```
pub struct FnObjective<F, A> {
    dim: usize,
    f: F,
    args: A,
}

impl<F, A> FnObjective<F, A>
where
    F: Fn(&Array1<f64>, &A) -> Result<f64> + Sync,
    A: Sync,
{
    pub fn new(dim: usize, f: F, args: A) -> Self {
        Self { dim, f, args }
    }

    pub fn args(&self) -> &A {
        &self.args
    }
}

impl<F, A> Objective for FnObjective<F, A>
where
    F: Fn(&Array1<f64>, &A) -> Result<f64> + Sync,
    A: Sync,
{
    fn dim(&self) -> usize {
        self.dim
    }

    fn value(&self, params: &Array1<f64>) -> Result<f64> {
        if params.len() != self.dim {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.dim,
                params.len()
            )));
        }
        (self.f)(params, &self.args)
    }
}
