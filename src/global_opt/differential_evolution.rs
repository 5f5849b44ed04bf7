//! Differential Evolution algorithm for global optimization.
//!
//! This module implements the Differential Evolution algorithm, a population-based
//! stochastic function minimizer that is particularly effective for global optimization.
//! The search is confined to a finite box and needs no initial guess.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{best_index, evaluate_population, latin_hypercube, random_point};
use crate::bounds::PairBounds;
use crate::error::{FitError, Result};
use crate::minimize::{minimize, MinimizeOptions};
use crate::objective::Objective;
use crate::result::{OptimizationResult, Status};

/// Smallest population regardless of the multiplier.
const MIN_POPULATION: usize = 5;

/// Strategies for creating candidate solutions in Differential Evolution.
///
/// All strategies use binomial crossover with the target vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DEStrategy {
    /// DE/best/1: x_best + F * (x_r1 - x_r2)
    #[default]
    Best1Bin,

    /// DE/rand/1: x_r1 + F * (x_r2 - x_r3)
    Rand1Bin,

    /// DE/current-to-best/1: x_i + F * (x_best - x_i) + F * (x_r1 - x_r2)
    CurrentToBest1Bin,
}

impl DEStrategy {
    /// Number of distinct random population members the mutation needs.
    fn random_members(&self) -> usize {
        match self {
            DEStrategy::Best1Bin | DEStrategy::CurrentToBest1Bin => 2,
            DEStrategy::Rand1Bin => 3,
        }
    }
}

/// How the initial population is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationInit {
    /// Stratified sample covering every parameter range evenly
    #[default]
    LatinHypercube,

    /// Independent uniform draws
    Random,
}

/// Differential Evolution algorithm for global optimization.
///
/// Differential Evolution is a population-based stochastic function minimizer
/// that is effective for global optimization. It uses vector differences to
/// perturb the population.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialEvolution {
    /// Strategy for creating candidate solutions
    pub strategy: DEStrategy,

    /// Population size multiplier (population size = multiplier * parameter count)
    pub popsize: usize,

    /// Range of the differential weight F; a new F is drawn from it every
    /// generation (dithering). Equal ends give a constant F.
    pub mutation: (f64, f64),

    /// Crossover probability (CR) in range [0, 1]
    pub recombination: f64,

    /// Maximum number of generations
    pub max_iter: usize,

    /// Relative tolerance on the spread of population energies
    pub tol: f64,

    /// Absolute tolerance on the spread of population energies
    pub atol: f64,

    /// Initial population scheme
    pub init: PopulationInit,

    /// Refine the best member with the local minimizer at the end
    pub polish: bool,

    /// Evaluate each generation's trial vectors on the rayon thread pool
    pub parallel: bool,

    /// Random seed; `None` draws one from the operating system
    pub seed: Option<u64>,

    /// Options for the polishing local minimization
    pub local: MinimizeOptions,
}

impl Default for DifferentialEvolution {
    fn default() -> Self {
        Self {
            strategy: DEStrategy::Best1Bin,
            popsize: 15,
            mutation: (0.5, 1.0),
            recombination: 0.7,
            max_iter: 1000,
            tol: 0.01,
            atol: 0.0,
            init: PopulationInit::LatinHypercube,
            polish: true,
            parallel: false,
            seed: None,
            local: MinimizeOptions::default(),
        }
    }
}

impl fmt::Display for DifferentialEvolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Differential Evolution:")?;
        writeln!(f, "  Strategy: {:?}", self.strategy)?;
        writeln!(f, "  Population multiplier: {}", self.popsize)?;
        writeln!(f, "  Mutation: {:?}", self.mutation)?;
        writeln!(f, "  Recombination: {}", self.recombination)?;
        writeln!(f, "  Parallel: {}", self.parallel)?;
        match self.seed {
            Some(seed) => writeln!(f, "  Random seed: {}", seed),
            None => writeln!(f, "  Random seed: none"),
        }
    }
}

impl DifferentialEvolution {
    /// Create a new DifferentialEvolution optimizer with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: DEStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the population size multiplier.
    pub fn with_popsize(mut self, popsize: usize) -> Self {
        self.popsize = popsize;
        self
    }

    /// Set the range of the differential weight (F).
    ///
    /// # Arguments
    ///
    /// * `min` - Lower end of the dithering range, in [0, 2]
    /// * `max` - Upper end of the dithering range, in [min, 2]
    pub fn with_mutation(mut self, min: f64, max: f64) -> Self {
        self.mutation = (min, max);
        self
    }

    /// Set the crossover probability (CR).
    pub fn with_recombination(mut self, recombination: f64) -> Self {
        self.recombination = recombination;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64, atol: f64) -> Self {
        self.tol = tol;
        self.atol = atol;
        self
    }

    pub fn with_init(mut self, init: PopulationInit) -> Self {
        self.init = init;
        self
    }

    pub fn with_polish(mut self, polish: bool) -> Self {
        self.polish = polish;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the random number generator seed.
    ///
    /// Setting the seed allows for reproducible optimization runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_local_options(mut self, local: MinimizeOptions) -> Self {
        self.local = local;
        self
    }

    fn validate(&self, dim: usize) -> Result<()> {
        if self.popsize == 0 {
            return Err(FitError::InvalidConfig(
                "popsize must be positive".to_string(),
            ));
        }
        let (lo, hi) = self.mutation;
        if !(0.0..=2.0).contains(&lo) || !(0.0..=2.0).contains(&hi) || lo > hi {
            return Err(FitError::InvalidConfig(format!(
                "mutation range must satisfy 0 <= min <= max <= 2, got ({}, {})",
                lo, hi
            )));
        }
        if !(0.0..=1.0).contains(&self.recombination) {
            return Err(FitError::InvalidConfig(format!(
                "recombination must lie in [0, 1], got {}",
                self.recombination
            )));
        }
        if !(self.tol >= 0.0 && self.atol >= 0.0) {
            return Err(FitError::InvalidConfig(
                "tol and atol must be non-negative".to_string(),
            ));
        }
        if self.polish {
            self.local.validate(dim)?;
        }
        Ok(())
    }

    /// Population size for a problem of `dim` parameters.
    pub fn population_size(&self, dim: usize) -> usize {
        (self.popsize * dim).max(MIN_POPULATION)
    }

    /// Run Differential Evolution over `bounds`, seeding the generator from
    /// `self.seed`.
    pub fn minimize<O: Objective + ?Sized>(
        &self,
        objective: &O,
        bounds: &PairBounds,
    ) -> Result<OptimizationResult> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.minimize_with_rng(objective, bounds, &mut rng)
    }

    /// Run Differential Evolution over `bounds` drawing all randomness from
    /// `rng`.
    ///
    /// # Arguments
    ///
    /// * `objective` - The objective to minimize
    /// * `bounds` - Finite `(lo, hi)` pair for every parameter
    /// * `rng` - Random number generator
    ///
    /// # Returns
    ///
    /// The best member found (polished if requested). Missing, infinite or
    /// inverted bounds give [`Status::BoundsInfeasible`]; running out of
    /// generations gives [`Status::MaxIterations`].
    pub fn minimize_with_rng<O, R>(
        &self,
        objective: &O,
        bounds: &PairBounds,
        rng: &mut R,
    ) -> Result<OptimizationResult>
    where
        O: Objective + ?Sized,
        R: Rng + ?Sized,
    {
        let dim = objective.dim();
        self.validate(dim)?;
        if bounds.len() != dim {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} bound pairs, got {}",
                dim,
                bounds.len()
            )));
        }

        if !bounds.is_finite() {
            return Ok(OptimizationResult::infeasible(
                Array1::zeros(dim),
                "Differential evolution needs finite bounds for every parameter".to_string(),
            ));
        }
        let midpoint: Vec<f64> = bounds.pairs().iter().map(|(lo, hi)| 0.5 * (lo + hi)).collect();
        if let Some(err) = bounds.infeasibility(&midpoint) {
            return Ok(OptimizationResult::infeasible(
                Array1::zeros(dim),
                format!("Infeasible bounds: {}", err),
            ));
        }

        let n_pop = self.population_size(dim);
        let mut population = match self.init {
            PopulationInit::LatinHypercube => latin_hypercube(bounds, n_pop, rng),
            PopulationInit::Random => (0..n_pop).map(|_| random_point(bounds, rng)).collect(),
        };
        let mut energies = evaluate_population(objective, &population, self.parallel)?;
        let mut nfev = n_pop;
        let mut best = best_index(&energies);
        let mut history = vec![energies[best]];

        let mut status = Status::MaxIterations;
        let mut generations = 0;

        for generation in 0..self.max_iter {
            if self.converged(&energies) {
                status = Status::Converged;
                break;
            }
            generations = generation + 1;

            let (lo, hi) = self.mutation;
            let weight = if hi > lo { rng.gen_range(lo..hi) } else { lo };

            // Trials are drawn sequentially so the generator stream does not
            // depend on how the evaluations are scheduled
            let trials: Vec<Array1<f64>> = (0..n_pop)
                .map(|i| self.trial_vector(i, &population, best, weight, bounds, rng))
                .collect();
            let trial_energies = evaluate_population(objective, &trials, self.parallel)?;
            nfev += n_pop;

            for (i, (trial, energy)) in trials.into_iter().zip(trial_energies).enumerate() {
                if energy < energies[i] {
                    population[i] = trial;
                    energies[i] = energy;
                }
            }
            best = best_index(&energies);
            history.push(energies[best]);

            log::trace!(
                "differential evolution generation {}: best = {:.6e}",
                generation,
                energies[best]
            );
        }
        if status == Status::MaxIterations && self.converged(&energies) {
            status = Status::Converged;
        }

        let mut params = population[best].clone();
        let mut fun = energies[best];
        if !fun.is_finite() {
            return Err(FitError::ModelEvaluation(
                "no population member could be evaluated inside the bounds".to_string(),
            ));
        }
        let mut message = match status {
            Status::Converged => format!(
                "Population converged after {} generations",
                generations
            ),
            _ => {
                log::warn!(
                    "differential evolution reached the generation limit ({})",
                    self.max_iter
                );
                format!("Maximum number of generations ({}) reached", self.max_iter)
            }
        };

        if self.polish {
            let polished = minimize(objective, &params, Some(bounds), &self.local)?;
            nfev += polished.nfev;
            if polished.fun < fun {
                log::debug!(
                    "differential evolution: polishing improved {:.6e} -> {:.6e}",
                    fun,
                    polished.fun
                );
                params = polished.params;
                fun = polished.fun;
                message.push_str("; polished");
            }
        }

        Ok(OptimizationResult {
            params,
            fun,
            status,
            message,
            nit: generations,
            nfev,
            history,
        })
    }

    /// Spread of the population energies below `atol + tol * |mean|`.
    fn converged(&self, energies: &[f64]) -> bool {
        let n = energies.len() as f64;
        let mean = energies.iter().sum::<f64>() / n;
        let variance = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt() <= self.atol + self.tol * mean.abs()
    }

    /// Create a trial vector for population member `target` with the
    /// configured strategy and binomial crossover.
    fn trial_vector<R: Rng + ?Sized>(
        &self,
        target: usize,
        population: &[Array1<f64>],
        best: usize,
        weight: f64,
        bounds: &PairBounds,
        rng: &mut R,
    ) -> Array1<f64> {
        let n_pop = population.len();
        let needed = self.strategy.random_members();

        // Distinct members other than the target
        let r: Vec<&Array1<f64>> = sample(rng, n_pop, needed + 1)
            .into_iter()
            .filter(|&i| i != target)
            .take(needed)
            .map(|i| &population[i])
            .collect();

        let mutant = match self.strategy {
            DEStrategy::Best1Bin => &population[best] + &((r[0] - r[1]) * weight),
            DEStrategy::Rand1Bin => r[0] + &((r[1] - r[2]) * weight),
            DEStrategy::CurrentToBest1Bin => {
                let current = &population[target];
                current + &((&population[best] - current) * weight) + &((r[0] - r[1]) * weight)
            }
        };

        let current = &population[target];
        let dim = current.len();
        let forced = rng.gen_range(0..dim);
        let mut trial = current.clone();
        for j in 0..dim {
            if j == forced || rng.gen::<f64>() < self.recombination {
                trial[j] = mutant[j];
            }
        }

        // Coordinates pushed out of the box are redrawn uniformly inside it
        for (value, &(lo, hi)) in trial.iter_mut().zip(bounds.pairs().iter()) {
            if !(*value >= lo && *value <= hi) {
                *value = lo + rng.gen::<f64>() * (hi - lo);
            }
        }
        trial
    }
}
