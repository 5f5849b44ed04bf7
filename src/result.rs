//! Results shared by the minimizer adapters.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Termination status of an optimization run.
///
/// Only [`Status::Converged`] means the returned parameters can be trusted
/// without further checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The solver's tolerance test was satisfied.
    Converged,

    /// The iteration or evaluation budget ran out first.
    MaxIterations,

    /// The start point lies outside the bounds, a lower bound exceeds its
    /// upper bound, or bounds required by the method are missing.
    BoundsInfeasible,

    /// No further progress was possible (line search or damping exhausted).
    Stalled,
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Converged)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Converged => "converged",
            Status::MaxIterations => "maximum iterations reached",
            Status::BoundsInfeasible => "bounds infeasible",
            Status::Stalled => "stalled",
        };
        f.write_str(s)
    }
}

/// Result of a local or global minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    /// Best parameters found
    pub params: Array1<f64>,

    /// Objective value at `params`
    pub fun: f64,

    /// Why the run stopped
    pub status: Status,

    /// A message describing the result
    pub message: String,

    /// Number of iterations performed
    pub nit: usize,

    /// Number of objective evaluations
    pub nfev: usize,

    /// Best-so-far objective value after each iteration (global methods only)
    pub history: Vec<f64>,
}

impl OptimizationResult {
    /// Whether the run converged.
    pub fn success(&self) -> bool {
        self.status.is_success()
    }

    /// Result for a run that never started because its start point or bounds
    /// are infeasible.
    pub(crate) fn infeasible(params: Array1<f64>, message: String) -> Self {
        log::warn!("{}", message);
        Self {
            params,
            fun: f64::INFINITY,
            status: Status::BoundsInfeasible,
            message,
            nit: 0,
            nfev: 0,
            history: Vec::new(),
        }
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Status: {}", self.status)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Objective: {:.6e}", self.fun)?;
        writeln!(f, "  Iterations: {}", self.nit)?;
        writeln!(f, "  Function evaluations: {}", self.nfev)?;
        writeln!(f, "  Parameters: {:?}", self.params.to_vec())?;
        Ok(())
    }
}
