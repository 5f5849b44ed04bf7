//! Bounded local minimization of scalar objectives.
//!
//! [`minimize`] is the general-purpose local adapter: it takes any
//! [`Objective`], an initial guess and optional box bounds in the
//! `(lo, hi)` pair convention, and runs the algorithm chosen by
//! [`LocalMethod`]. General equality and inequality [`Constraint`]s are part
//! of the configuration surface and are honoured by
//! [`LocalMethod::ProjectedBfgs`].
//!
//! The returned parameters always lie inside the bounds. Whether they can be
//! trusted is reported by [`OptimizationResult::status`].

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::bounds::PairBounds;
use crate::error::{FitError, Result};
use crate::objective::Objective;
use crate::result::OptimizationResult;

mod bfgs;
mod nelder_mead;

/// Local search algorithms supported by [`minimize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalMethod {
    /// Quasi-Newton with BFGS updates, gradient projection onto the box and
    /// Armijo backtracking. Supports general constraints through an
    /// augmented-Lagrangian outer loop.
    #[default]
    ProjectedBfgs,

    /// Derivative-free downhill simplex. Bounds are enforced by clamping;
    /// general constraints are not supported.
    NelderMead,
}

impl LocalMethod {
    /// Whether the method accepts [`Constraint`]s beyond simple bounds.
    pub fn supports_constraints(&self) -> bool {
        matches!(self, LocalMethod::ProjectedBfgs)
    }
}

impl fmt::Display for LocalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalMethod::ProjectedBfgs => write!(f, "projected BFGS"),
            LocalMethod::NelderMead => write!(f, "Nelder-Mead"),
        }
    }
}

/// Kind of a general constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// `fun(x) == 0`
    Eq,

    /// `fun(x) >= 0`
    Ineq,
}

/// A general constraint `fun(x) == 0` or `fun(x) >= 0`.
#[derive(Clone)]
pub struct Constraint {
    pub kind: ConstraintKind,
    fun: Arc<dyn Fn(&Array1<f64>) -> f64 + Send + Sync>,
}

impl Constraint {
    pub fn new<F>(kind: ConstraintKind, fun: F) -> Self
    where
        F: Fn(&Array1<f64>) -> f64 + Send + Sync + 'static,
    {
        Self {
            kind,
            fun: Arc::new(fun),
        }
    }

    /// Equality constraint `fun(x) == 0`.
    pub fn eq<F>(fun: F) -> Self
    where
        F: Fn(&Array1<f64>) -> f64 + Send + Sync + 'static,
    {
        Self::new(ConstraintKind::Eq, fun)
    }

    /// Inequality constraint `fun(x) >= 0`.
    pub fn ineq<F>(fun: F) -> Self
    where
        F: Fn(&Array1<f64>) -> f64 + Send + Sync + 'static,
    {
        Self::new(ConstraintKind::Ineq, fun)
    }

    pub fn evaluate(&self, x: &Array1<f64>) -> f64 {
        (self.fun)(x)
    }

    /// Amount by which `x` violates the constraint (0 when satisfied).
    pub fn violation(&self, x: &Array1<f64>) -> f64 {
        let c = self.evaluate(x);
        match self.kind {
            ConstraintKind::Eq => c.abs(),
            ConstraintKind::Ineq => (-c).max(0.0),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Options for [`minimize`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizeOptions {
    /// Local search algorithm
    pub method: LocalMethod,

    /// General constraints; closures are not serialized
    #[serde(skip)]
    pub constraints: Vec<Constraint>,

    /// Maximum number of iterations of the local search
    pub max_iter: usize,

    /// Relative tolerance on the change of the objective
    pub ftol: f64,

    /// Tolerance on the projected gradient (BFGS) or simplex size (Nelder-Mead)
    pub gtol: f64,

    /// Maximum number of augmented-Lagrangian outer iterations
    pub max_outer_iter: usize,

    /// Largest constraint violation accepted as feasible
    pub constraint_tol: f64,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            method: LocalMethod::ProjectedBfgs,
            constraints: Vec::new(),
            max_iter: 500,
            ftol: 1e-12,
            gtol: 1e-8,
            max_outer_iter: 20,
            constraint_tol: 1e-6,
        }
    }
}

impl MinimizeOptions {
    pub fn new(method: LocalMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: LocalMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    /// Check the options against a problem of `dim` parameters.
    ///
    /// Runs before any objective evaluation.
    pub fn validate(&self, dim: usize) -> Result<()> {
        if dim == 0 {
            return Err(FitError::InvalidConfig(
                "cannot minimize over zero parameters".to_string(),
            ));
        }
        if self.max_iter == 0 {
            return Err(FitError::InvalidConfig(
                "max_iter must be positive".to_string(),
            ));
        }
        for (name, value) in [
            ("ftol", self.ftol),
            ("gtol", self.gtol),
            ("constraint_tol", self.constraint_tol),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(FitError::InvalidConfig(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        if !self.constraints.is_empty() {
            if !self.method.supports_constraints() {
                return Err(FitError::InvalidConfig(format!(
                    "{} does not support general constraints",
                    self.method
                )));
            }
            if self.max_outer_iter == 0 {
                return Err(FitError::InvalidConfig(
                    "max_outer_iter must be positive when constraints are given".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Minimize `objective` locally starting from `x0`.
///
/// # Arguments
///
/// * `objective` - The scalar function to minimize
/// * `x0` - Initial guess
/// * `bounds` - Optional box, one `(lo, hi)` pair per parameter
/// * `options` - Method, constraints and tolerances
///
/// # Returns
///
/// Invalid options and dimension mismatches fail before any evaluation. A
/// start point outside the box (or an inverted pair) gives a result with
/// [`Status::BoundsInfeasible`](crate::result::Status::BoundsInfeasible).
/// A non-finite objective value is returned as
/// [`FitError::ModelEvaluation`].
pub fn minimize<O: Objective + ?Sized>(
    objective: &O,
    x0: &Array1<f64>,
    bounds: Option<&PairBounds>,
    options: &MinimizeOptions,
) -> Result<OptimizationResult> {
    let dim = objective.dim();
    options.validate(dim)?;

    if x0.len() != dim {
        return Err(FitError::DimensionMismatch(format!(
            "Initial guess has {} entries but the objective expects {}",
            x0.len(),
            dim
        )));
    }
    if let Some(b) = bounds {
        if b.len() != dim {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} bound pairs, got {}",
                dim,
                b.len()
            )));
        }
        if let Some(err) = b.infeasibility(&x0.to_vec()) {
            return Ok(OptimizationResult::infeasible(
                x0.clone(),
                format!("Initial guess is infeasible: {}", err),
            ));
        }
    }

    log::debug!("minimize: method = {}, x0 = {:?}", options.method, x0.to_vec());

    let result = match options.method {
        LocalMethod::ProjectedBfgs => bfgs::minimize(objective, x0, bounds, options)?,
        LocalMethod::NelderMead => nelder_mead::minimize(objective, x0, bounds, options)?,
    };

    log::debug!(
        "minimize: {} after {} iterations, fun = {:.6e}",
        result.status,
        result.nit,
        result.fun
    );
    Ok(result)
}
