//! Basin Hopping algorithm for global optimization.
//!
//! This module implements the Basin Hopping algorithm, a stochastic algorithm
//! that combines random perturbation of the current minimum with local
//! minimization and a Metropolis acceptance test.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bounds::PairBounds;
use crate::error::{FitError, Result};
use crate::minimize::{minimize, MinimizeOptions};
use crate::objective::Objective;
use crate::result::{OptimizationResult, Status};

/// Basin Hopping algorithm for global optimization.
///
/// Each iteration displaces every coordinate of the current minimum by a
/// uniform step in `[-step_size, step_size]`, runs the local minimizer from
/// there and accepts the new minimum with probability
/// `min(1, exp(-(f_new - f_old) / temperature))`. The best minimum seen is
/// only replaced by a strictly lower one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasinHopping {
    /// Number of basin-hopping iterations
    pub niter: usize,

    /// Temperature for Metropolis acceptance
    pub temperature: f64,

    /// Initial maximum displacement per coordinate
    pub step_size: f64,

    /// Iterations between step-size adjustments; 0 keeps the step fixed
    pub adaptive_interval: usize,

    /// Acceptance rate the step-size adjustment aims for
    pub target_accept_rate: f64,

    /// Factor by which the step size shrinks or grows
    pub step_factor: f64,

    /// Random seed; `None` draws one from the operating system
    pub seed: Option<u64>,

    /// Options for every local minimization
    pub local: MinimizeOptions,
}

impl Default for BasinHopping {
    fn default() -> Self {
        Self {
            niter: 100,
            temperature: 1.0,
            step_size: 0.5,
            adaptive_interval: 50,
            target_accept_rate: 0.5,
            step_factor: 0.9,
            seed: None,
            local: MinimizeOptions::default(),
        }
    }
}

/// Settings for [`BasinHopping::until_stable`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityCheck {
    /// Factor applied to `niter` between rounds
    pub factor: usize,

    /// Relative change of the best parameters regarded as stable
    pub rtol: f64,

    /// Maximum number of rounds, including the first
    pub max_rounds: usize,
}

impl Default for StabilityCheck {
    fn default() -> Self {
        Self {
            factor: 10,
            rtol: 1e-6,
            max_rounds: 3,
        }
    }
}

impl BasinHopping {
    /// Create a new BasinHopping optimizer with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_niter(mut self, niter: usize) -> Self {
        self.niter = niter;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    /// Set the adaptive step-size schedule.
    ///
    /// # Arguments
    ///
    /// * `interval` - Iterations between adjustments (0 disables adaptation)
    /// * `target_accept_rate` - Desired fraction of accepted steps
    /// * `factor` - Multiplicative adjustment in (0, 1)
    pub fn with_adaptive_step(
        mut self,
        interval: usize,
        target_accept_rate: f64,
        factor: f64,
    ) -> Self {
        self.adaptive_interval = interval;
        self.target_accept_rate = target_accept_rate;
        self.step_factor = factor;
        self
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_local_options(mut self, local: MinimizeOptions) -> Self {
        self.local = local;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.temperature >= 0.0 && self.temperature.is_finite()) {
            return Err(FitError::InvalidConfig(format!(
                "temperature must be finite and non-negative, got {}",
                self.temperature
            )));
        }
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return Err(FitError::InvalidConfig(format!(
                "step_size must be finite and positive, got {}",
                self.step_size
            )));
        }
        if self.adaptive_interval > 0 {
            if !(self.target_accept_rate > 0.0 && self.target_accept_rate < 1.0) {
                return Err(FitError::InvalidConfig(format!(
                    "target_accept_rate must lie in (0, 1), got {}",
                    self.target_accept_rate
                )));
            }
            if !(self.step_factor > 0.0 && self.step_factor < 1.0) {
                return Err(FitError::InvalidConfig(format!(
                    "step_factor must lie in (0, 1), got {}",
                    self.step_factor
                )));
            }
        }
        Ok(())
    }

    /// Run Basin Hopping from `x0`, seeding the generator from `self.seed`.
    pub fn minimize<O: Objective + ?Sized>(
        &self,
        objective: &O,
        x0: &Array1<f64>,
        bounds: Option<&PairBounds>,
    ) -> Result<OptimizationResult> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.minimize_with_rng(objective, x0, bounds, &mut rng)
    }

    /// Run Basin Hopping from `x0` drawing all randomness from `rng`.
    ///
    /// # Arguments
    ///
    /// * `objective` - The objective to minimize
    /// * `x0` - Initial guess
    /// * `bounds` - Optional box; perturbed points are clipped into it
    /// * `rng` - Random number generator
    ///
    /// # Returns
    ///
    /// The best local minimum found, with `history` holding the best value
    /// after the initial minimization and after every iteration.
    pub fn minimize_with_rng<O, R>(
        &self,
        objective: &O,
        x0: &Array1<f64>,
        bounds: Option<&PairBounds>,
        rng: &mut R,
    ) -> Result<OptimizationResult>
    where
        O: Objective + ?Sized,
        R: Rng + ?Sized,
    {
        self.validate()?;
        self.local.validate(objective.dim())?;

        // Dimension and feasibility checks happen inside the local adapter
        let first = minimize(objective, x0, bounds, &self.local)?;
        if first.status == Status::BoundsInfeasible {
            return Ok(first);
        }

        let mut nfev = first.nfev;
        let mut current_params = first.params.clone();
        let mut current_fun = first.fun;
        let mut best = first;
        let mut history = Vec::with_capacity(self.niter + 1);
        history.push(best.fun);

        let mut step_size = self.step_size;
        let mut accepted_in_window = 0usize;
        let mut total_accepted = 0usize;
        let mut failed_local = 0usize;

        for iteration in 0..self.niter {
            let mut trial = current_params.clone();
            for value in trial.iter_mut() {
                *value += rng.gen_range(-step_size..=step_size);
            }
            if let Some(b) = bounds {
                b.clip(trial.iter_mut());
            }

            // A hop whose local search leaves the model's domain is rejected
            let local = match minimize(objective, &trial, bounds, &self.local) {
                Ok(local) => {
                    nfev += local.nfev;
                    if !local.success() {
                        failed_local += 1;
                    }
                    Some(local)
                }
                Err(FitError::ModelEvaluation(msg)) => {
                    log::debug!("basin hopping iteration {}: rejecting hop: {}", iteration, msg);
                    failed_local += 1;
                    None
                }
                Err(e) => return Err(e),
            };

            let delta = local.as_ref().map_or(f64::INFINITY, |l| l.fun - current_fun);
            let weight = if delta <= 0.0 {
                1.0
            } else if self.temperature > 0.0 {
                (-delta / self.temperature).exp()
            } else {
                0.0
            };
            // Drawn for every hop so rejected hops keep the stream aligned
            let accept = weight > rng.gen::<f64>();

            if let Some(local) = local.filter(|_| accept) {
                accepted_in_window += 1;
                total_accepted += 1;
                current_params = local.params.clone();
                current_fun = local.fun;
                if local.fun < best.fun {
                    log::debug!(
                        "basin hopping iteration {}: new best {:.6e}",
                        iteration,
                        local.fun
                    );
                    best = local;
                }
            }
            history.push(best.fun);

            if self.adaptive_interval > 0 && (iteration + 1) % self.adaptive_interval == 0 {
                let rate = accepted_in_window as f64 / self.adaptive_interval as f64;
                if rate > self.target_accept_rate {
                    step_size /= self.step_factor;
                } else {
                    step_size *= self.step_factor;
                }
                accepted_in_window = 0;
                log::trace!(
                    "basin hopping: acceptance rate {:.2}, step size {:.3e}",
                    rate,
                    step_size
                );
            }
        }

        if failed_local > 0 {
            log::debug!(
                "basin hopping: {} of {} local searches did not converge",
                failed_local,
                self.niter
            );
        }

        let message = format!(
            "Basin hopping: {} iterations, {} accepted; lowest minimum: {}",
            self.niter, total_accepted, best.message
        );
        Ok(OptimizationResult {
            params: best.params,
            fun: best.fun,
            status: best.status,
            message,
            nit: self.niter,
            nfev,
            history,
        })
    }

    /// Repeat the search with `niter` multiplied by `check.factor` until the
    /// best parameters stop changing.
    ///
    /// Every round restarts from `x0` with the same seed, so each longer run
    /// extends the previous one and its best value can only improve. If the
    /// parameters still move after `check.max_rounds` rounds, the last result
    /// is returned with [`Status::MaxIterations`].
    pub fn until_stable<O: Objective + ?Sized>(
        &self,
        objective: &O,
        x0: &Array1<f64>,
        bounds: Option<&PairBounds>,
        check: &StabilityCheck,
    ) -> Result<OptimizationResult> {
        if check.factor < 2 || check.max_rounds == 0 {
            return Err(FitError::InvalidConfig(
                "stability check needs factor >= 2 and at least one round".to_string(),
            ));
        }

        let mut config = self.clone();
        if config.seed.is_none() {
            config.seed = Some(rand::thread_rng().gen());
        }

        let mut previous = config.minimize(objective, x0, bounds)?;
        if previous.status == Status::BoundsInfeasible {
            return Ok(previous);
        }

        for round in 1..check.max_rounds {
            config.niter = config.niter.max(1) * check.factor;
            let next = config.minimize(objective, x0, bounds)?;

            let scale = previous.params.iter().fold(1.0f64, |m, v| m.max(v.abs()));
            let change = next
                .params
                .iter()
                .zip(previous.params.iter())
                .fold(0.0f64, |m, (a, b)| m.max((a - b).abs()));
            log::debug!(
                "basin hopping round {}: niter = {}, parameter change {:.3e}",
                round,
                config.niter,
                change
            );

            if change <= check.rtol * scale {
                return Ok(next);
            }
            previous = next;
        }

        if check.max_rounds == 1 {
            return Ok(previous);
        }
        log::warn!(
            "basin hopping result still changing after {} rounds (niter = {})",
            check.max_rounds,
            config.niter
        );
        previous.status = Status::MaxIterations;
        previous.message = format!(
            "Best parameters not stable after {} rounds; {}",
            check.max_rounds, previous.message
        );
        Ok(previous)
    }
}
