//! Global optimization methods for finding global minima.
//!
//! This module provides two stochastic searches over a scalar [`Objective`]:
//! [`BasinHopping`], which repeatedly perturbs the current minimum and
//! re-runs the local minimizer, and [`DifferentialEvolution`], a
//! population-based search over a finite box that needs no initial guess.
//!
//! Both treat the objective as a black box and draw all randomness from an
//! explicit, seedable generator, so a fixed seed reproduces a run exactly.

use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;

use crate::bounds::PairBounds;
use crate::error::Result;
use crate::objective::{trial_value, Objective};

mod basin_hopping;
mod differential_evolution;

pub use basin_hopping::{BasinHopping, StabilityCheck};
pub use differential_evolution::{DEStrategy, DifferentialEvolution, PopulationInit};

/// Generate a random point within finite bounds.
///
/// # Arguments
///
/// * `bounds` - Lower and upper bounds for each parameter; all must be finite
/// * `rng` - Random number generator
fn random_point<R: Rng + ?Sized>(bounds: &PairBounds, rng: &mut R) -> Array1<f64> {
    bounds
        .pairs()
        .iter()
        .map(|&(lo, hi)| lo + rng.gen::<f64>() * (hi - lo))
        .collect()
}

/// Latin hypercube sample of `n` points within finite bounds.
///
/// Every parameter range is cut into `n` equal strata and each stratum is
/// used by exactly one point.
fn latin_hypercube<R: Rng + ?Sized>(
    bounds: &PairBounds,
    n: usize,
    rng: &mut R,
) -> Vec<Array1<f64>> {
    let dim = bounds.len();
    let mut population = vec![Array1::zeros(dim); n];
    let segment = 1.0 / n as f64;

    for (j, &(lo, hi)) in bounds.pairs().iter().enumerate() {
        let mut strata: Vec<usize> = (0..n).collect();
        strata.shuffle(rng);
        for (point, &stratum) in population.iter_mut().zip(strata.iter()) {
            let unit = (stratum as f64 + rng.gen::<f64>()) * segment;
            point[j] = lo + unit * (hi - lo);
        }
    }

    population
}

/// Evaluate the objective at every point, keeping the order of `population`.
///
/// Points outside the model's domain score `+inf`. With `parallel` set the
/// evaluations run on the rayon thread pool; the result does not depend on
/// scheduling.
fn evaluate_population<O: Objective + ?Sized>(
    objective: &O,
    population: &[Array1<f64>],
    parallel: bool,
) -> Result<Vec<f64>> {
    if parallel {
        population
            .par_iter()
            .map(|point| trial_value(objective, point))
            .collect()
    } else {
        population
            .iter()
            .map(|point| trial_value(objective, point))
            .collect()
    }
}

/// Index of the lowest value; the first one wins ties.
fn best_index(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate().skip(1) {
        if value < values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::FnObjective;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_random_point_in_bounds() {
        let bounds = PairBounds::new(vec![(0.0, 1.0), (-5.0, -4.0), (2.0, 2.0)]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let p = random_point(&bounds, &mut rng);
            assert!(bounds.infeasibility(&p.to_vec()).is_none());
        }
    }

    #[test]
    fn test_latin_hypercube_covers_every_stratum() {
        let bounds = PairBounds::new(vec![(0.0, 10.0), (-1.0, 1.0)]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let n = 10;
        let population = latin_hypercube(&bounds, n, &mut rng);
        assert_eq!(population.len(), n);

        let mut strata: Vec<usize> = population.iter().map(|p| p[0].floor() as usize).collect();
        strata.sort_unstable();
        assert_eq!(strata, (0..n).collect::<Vec<_>>());
        assert!(population.iter().all(|p| p[1] >= -1.0 && p[1] <= 1.0));
    }

    #[test]
    fn test_parallel_evaluation_preserves_order() {
        let objective = FnObjective::new(1, |p: &Array1<f64>, _: &()| Ok(p[0] * 2.0), ());
        let population: Vec<Array1<f64>> =
            (0..50).map(|i| Array1::from_elem(1, i as f64)).collect();
        let sequential = evaluate_population(&objective, &population, false).unwrap();
        let parallel = evaluate_population(&objective, &population, true).unwrap();
        assert_eq!(sequential, parallel);
        assert_eq!(parallel[49], 98.0);
    }

    #[test]
    fn test_best_index_prefers_first_tie() {
        assert_eq!(best_index(&[3.0, 1.0, 1.0, 2.0]), 1);
        assert_eq!(best_index(&[0.5]), 0);
    }
}
