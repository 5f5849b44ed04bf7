//! Projected BFGS with an augmented-Lagrangian outer loop for constraints.

use ndarray::{Array1, Array2};

use super::{Constraint, ConstraintKind, MinimizeOptions};
use crate::bounds::PairBounds;
use crate::error::Result;
use crate::objective::{checked_value, trial_value, Objective};
use crate::result::{OptimizationResult, Status};
use crate::utils::finite_difference::gradient;

/// Sufficient-decrease constant of the Armijo rule.
const ARMIJO_C1: f64 = 1e-4;

const MAX_BACKTRACKS: usize = 40;

const INITIAL_PENALTY: f64 = 10.0;
const MAX_PENALTY: f64 = 1e10;

pub(super) fn minimize<O: Objective + ?Sized>(
    objective: &O,
    x0: &Array1<f64>,
    bounds: Option<&PairBounds>,
    options: &MinimizeOptions,
) -> Result<OptimizationResult> {
    let mut x = x0.clone();
    if let Some(b) = bounds {
        b.clip(x.iter_mut());
    }

    if options.constraints.is_empty() {
        box_minimize(objective, x, bounds, options)
    } else {
        augmented_lagrangian(objective, x, bounds, options)
    }
}

/// Gradient with the components that would push `x` out of the box zeroed.
fn projected_gradient(
    x: &Array1<f64>,
    g: &Array1<f64>,
    bounds: Option<&PairBounds>,
) -> Array1<f64> {
    let mut pg = g.clone();
    if let Some(b) = bounds {
        for (i, &(lo, hi)) in b.pairs().iter().enumerate() {
            if (x[i] <= lo && g[i] > 0.0) || (x[i] >= hi && g[i] < 0.0) {
                pg[i] = 0.0;
            }
        }
    }
    pg
}

/// Quasi-Newton direction `-H g` restricted to the free variables.
fn search_direction(h: &Array2<f64>, g: &Array1<f64>, free: &[bool]) -> Array1<f64> {
    let n = g.len();
    let mut d = Array1::zeros(n);
    for i in (0..n).filter(|&i| free[i]) {
        d[i] = -(0..n).filter(|&j| free[j]).map(|j| h[[i, j]] * g[j]).sum::<f64>();
    }
    d
}

/// In-place BFGS update of the inverse Hessian approximation.
fn bfgs_update(h: &mut Array2<f64>, s: &Array1<f64>, y: &Array1<f64>, sy: f64) {
    let n = s.len();
    let rho = 1.0 / sy;
    let hy = h.dot(y);
    let yhy = y.dot(&hy);
    for i in 0..n {
        for j in 0..n {
            h[[i, j]] += -rho * (s[i] * hy[j] + hy[i] * s[j])
                + (rho * rho * yhy + rho) * s[i] * s[j];
        }
    }
}

fn box_minimize<O: Objective + ?Sized>(
    objective: &O,
    mut x: Array1<f64>,
    bounds: Option<&PairBounds>,
    options: &MinimizeOptions,
) -> Result<OptimizationResult> {
    let n = x.len();
    let f_eval = |p: &Array1<f64>| checked_value(objective, p);

    let mut f = f_eval(&x)?;
    let mut g = gradient(&f_eval, &x, bounds, None)?;
    let mut nfev = 1 + 2 * n;
    let mut h = Array2::<f64>::eye(n);
    let mut scaled = false;

    let finish = |params, fun, status, message, nit, nfev| OptimizationResult {
        params,
        fun,
        status,
        message,
        nit,
        nfev,
        history: Vec::new(),
    };

    for iter in 0..options.max_iter {
        let pg = projected_gradient(&x, &g, bounds);
        let pg_norm = pg.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if pg_norm <= options.gtol {
            let message = format!("Projected gradient {:.2e} below gtol", pg_norm);
            return Ok(finish(x, f, Status::Converged, message, iter, nfev));
        }

        // Variables held at a bound by the gradient stay fixed this iteration
        let free: Vec<bool> = pg
            .iter()
            .zip(g.iter())
            .map(|(&p, &gi)| p != 0.0 || gi == 0.0)
            .collect();

        let mut accepted = None;
        for steepest in [false, true] {
            let d = if steepest {
                pg.mapv(|v| -v)
            } else {
                search_direction(&h, &g, &free)
            };
            if g.dot(&d) < 0.0 {
                let mut alpha = 1.0;
                for _ in 0..MAX_BACKTRACKS {
                    let mut trial = &x + &(&d * alpha);
                    if let Some(b) = bounds {
                        b.clip(trial.iter_mut());
                    }
                    let slope = g.dot(&(&trial - &x));
                    if slope < 0.0 {
                        let f_trial = trial_value(objective, &trial)?;
                        nfev += 1;
                        if f_trial <= f + ARMIJO_C1 * slope {
                            accepted = Some((trial, f_trial));
                            break;
                        }
                    }
                    alpha *= 0.5;
                }
            }

            if accepted.is_some() {
                break;
            }
            // Quasi-Newton direction failed; restart from steepest descent
            h = Array2::eye(n);
            scaled = false;
        }

        let (x_new, f_new) = match accepted {
            Some(step) => step,
            None => {
                let message = "Line search could not decrease the objective".to_string();
                log::debug!("projected BFGS stalled at iteration {}", iter);
                return Ok(finish(x, f, Status::Stalled, message, iter, nfev));
            }
        };

        let g_new = gradient(&f_eval, &x_new, bounds, None)?;
        nfev += 2 * n;

        let s = &x_new - &x;
        let y = &g_new - &g;
        let sy = s.dot(&y);
        if sy > 1e-12 * s.dot(&s).sqrt() * y.dot(&y).sqrt() {
            if !scaled {
                // Initial inverse Hessian scaled to the observed curvature
                h = Array2::eye(n) * (sy / y.dot(&y));
                scaled = true;
            }
            bfgs_update(&mut h, &s, &y, sy);
        }

        log::trace!(
            "projected BFGS iteration {}: f = {:.6e} -> {:.6e}",
            iter,
            f,
            f_new
        );

        let decrease = f - f_new;
        x = x_new;
        f = f_new;
        g = g_new;

        if decrease <= options.ftol * f.abs().max(1.0) {
            let message = format!("Objective decrease {:.2e} below ftol", decrease);
            return Ok(finish(x, f, Status::Converged, message, iter + 1, nfev));
        }
    }

    log::warn!(
        "projected BFGS reached the iteration limit ({})",
        options.max_iter
    );
    let message = format!("Maximum number of iterations ({}) reached", options.max_iter);
    Ok(finish(x, f, Status::MaxIterations, message, options.max_iter, nfev))
}

/// Objective plus augmented-Lagrangian terms for the general constraints.
struct AugmentedLagrangian<'a, O: ?Sized> {
    objective: &'a O,
    constraints: &'a [Constraint],
    multipliers: Vec<f64>,
    penalty: f64,
}

impl<'a, O: Objective + ?Sized> Objective for AugmentedLagrangian<'a, O> {
    fn dim(&self) -> usize {
        self.objective.dim()
    }

    fn value(&self, x: &Array1<f64>) -> Result<f64> {
        let mu = self.penalty;
        let mut total = checked_value(self.objective, x)?;
        for (constraint, &lambda) in self.constraints.iter().zip(self.multipliers.iter()) {
            let c = constraint.evaluate(x);
            total += match constraint.kind {
                ConstraintKind::Eq => lambda * c + 0.5 * mu * c * c,
                ConstraintKind::Ineq => {
                    if lambda - mu * c > 0.0 {
                        -lambda * c + 0.5 * mu * c * c
                    } else {
                        -lambda * lambda / (2.0 * mu)
                    }
                }
            };
        }
        Ok(total)
    }
}

fn max_violation(constraints: &[Constraint], x: &Array1<f64>) -> f64 {
    constraints
        .iter()
        .map(|c| c.violation(x))
        .fold(0.0f64, f64::max)
}

fn augmented_lagrangian<O: Objective + ?Sized>(
    objective: &O,
    mut x: Array1<f64>,
    bounds: Option<&PairBounds>,
    options: &MinimizeOptions,
) -> Result<OptimizationResult> {
    let constraints = options.constraints.as_slice();
    let mut multipliers = vec![0.0; constraints.len()];
    let mut penalty = INITIAL_PENALTY;
    let mut previous_violation = f64::INFINITY;
    let mut nit = 0;
    let mut nfev = 0;

    for outer in 0..options.max_outer_iter {
        let subproblem = AugmentedLagrangian {
            objective,
            constraints,
            multipliers: multipliers.clone(),
            penalty,
        };
        let inner = box_minimize(&subproblem, x, bounds, options)?;
        nit += inner.nit;
        nfev += inner.nfev;
        x = inner.params;

        let violation = max_violation(constraints, &x);
        log::trace!(
            "augmented Lagrangian outer iteration {}: violation = {:.3e}, penalty = {:.1e}",
            outer,
            violation,
            penalty
        );

        if violation <= options.constraint_tol && inner.status == Status::Converged {
            let fun = checked_value(objective, &x)?;
            return Ok(OptimizationResult {
                params: x,
                fun,
                status: Status::Converged,
                message: format!("Converged with constraint violation {:.2e}", violation),
                nit,
                nfev: nfev + 1,
                history: Vec::new(),
            });
        }

        for (lambda, constraint) in multipliers.iter_mut().zip(constraints.iter()) {
            let c = constraint.evaluate(&x);
            *lambda = match constraint.kind {
                ConstraintKind::Eq => *lambda + penalty * c,
                ConstraintKind::Ineq => (*lambda - penalty * c).max(0.0),
            };
        }
        if violation > 0.25 * previous_violation {
            penalty = (penalty * 10.0).min(MAX_PENALTY);
        }
        previous_violation = violation;
    }

    let violation = max_violation(constraints, &x);
    log::warn!(
        "constraints not satisfied after {} outer iterations (violation {:.2e})",
        options.max_outer_iter,
        violation
    );
    let fun = checked_value(objective, &x)?;
    Ok(OptimizationResult {
        params: x,
        fun,
        status: Status::MaxIterations,
        message: format!(
            "Constraint violation {:.2e} after {} outer iterations",
            violation, options.max_outer_iter
        ),
        nit,
        nfev: nfev + 1,
        history: Vec::new(),
    })
}
