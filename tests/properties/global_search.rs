use std::f64::consts::PI;

use approx::assert_relative_eq;
use mmfit_rs::bounds::PairBounds;
use mmfit_rs::data::NoiseModel;
use mmfit_rs::error::Result;
use mmfit_rs::global_opt::{BasinHopping, DEStrategy, DifferentialEvolution};
use mmfit_rs::model::MichaelisMenten;
use mmfit_rs::objective::{FnObjective, Loss, ModelObjective};
use ndarray::{array, Array1};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::{array_approx_eq, dataset, exact_dataset, true_params};

/// Rastrigin function: f(x) = 10n + sum[x_i^2 - 10cos(2πx_i)]
/// Global minimum at x_i = 0 for all i, with f(x) = 0
fn rastrigin(x: &Array1<f64>, _: &()) -> Result<f64> {
    Ok(10.0 * x.len() as f64
        + x.iter()
            .map(|v| v * v - 10.0 * (2.0 * PI * v).cos())
            .sum::<f64>())
}

fn mm_bounds() -> PairBounds {
    PairBounds::new(vec![(0.0, 10.0), (0.0, 10.0)]).unwrap()
}

#[test]
fn test_differential_evolution_is_deterministic_for_a_seed() {
    let data = dataset(NoiseModel::Relative(0.1), 8);
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);

    for strategy in [DEStrategy::Best1Bin, DEStrategy::Rand1Bin] {
        for parallel in [false, true] {
            let de = DifferentialEvolution::new()
                .with_strategy(strategy)
                .with_parallel(parallel)
                .with_seed(17);
            let first = de.minimize(&objective, &mm_bounds()).unwrap();
            let second = de.minimize(&objective, &mm_bounds()).unwrap();
            assert_eq!(first, second);
        }
    }
}

#[test]
fn test_differential_evolution_same_rng_state_same_result() {
    let objective = FnObjective::new(2, rastrigin, ());
    let bounds = PairBounds::new(vec![(-5.12, 5.12); 2]).unwrap();
    let de = DifferentialEvolution::new().with_max_iter(300);

    let mut rng_a = ChaCha8Rng::seed_from_u64(5);
    let mut rng_b = ChaCha8Rng::seed_from_u64(5);
    let a = de.minimize_with_rng(&objective, &bounds, &mut rng_a).unwrap();
    let b = de.minimize_with_rng(&objective, &bounds, &mut rng_b).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_differential_evolution_recovers_exact_parameters() {
    let data = exact_dataset();
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let result = DifferentialEvolution::new()
        .with_seed(1)
        .minimize(&objective, &mm_bounds())
        .unwrap();

    assert!(array_approx_eq(&result.params, &true_params(), 1e-4));
    assert!(result.fun < 1e-10);
}

#[test]
fn test_basin_hopping_more_iterations_never_worsen_best() {
    let objective = FnObjective::new(2, rastrigin, ());
    let bounds = PairBounds::new(vec![(-5.12, 5.12); 2]).unwrap();
    let x0 = array![3.3, -2.7];

    let short = BasinHopping::new()
        .with_niter(10)
        .with_seed(123)
        .minimize(&objective, &x0, Some(&bounds))
        .unwrap();
    let long = BasinHopping::new()
        .with_niter(100)
        .with_seed(123)
        .minimize(&objective, &x0, Some(&bounds))
        .unwrap();

    assert!(long.fun <= short.fun);
    assert_eq!(short.history.len(), 11);
    assert_eq!(long.history.len(), 101);
    // The longer run replays the shorter one before continuing
    assert_eq!(&long.history[..11], &short.history[..]);
    for window in long.history.windows(2) {
        assert!(window[1] <= window[0]);
    }
    assert_eq!(*long.history.last().unwrap(), long.fun);
}

#[test]
fn test_basin_hopping_on_noisy_data_is_monotone() {
    let data = dataset(NoiseModel::Relative(0.1), 21);
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfAbsolute);
    let x0 = array![1.0, 1.0];

    let mut previous = f64::INFINITY;
    for niter in [1, 5, 20] {
        let result = BasinHopping::new()
            .with_niter(niter)
            .with_seed(4)
            .minimize(&objective, &x0, Some(&mm_bounds()))
            .unwrap();
        assert!(result.fun <= previous);
        previous = result.fun;
    }
}

#[test]
fn test_global_methods_agree_on_exact_data() {
    let data = exact_dataset();
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);

    let bh = BasinHopping::new()
        .with_niter(10)
        .with_seed(0)
        .minimize(&objective, &array![1.0, 1.0], Some(&mm_bounds()))
        .unwrap();
    let de = DifferentialEvolution::new()
        .with_seed(0)
        .minimize(&objective, &mm_bounds())
        .unwrap();

    assert_relative_eq!(bh.params[0], de.params[0], epsilon = 1e-4);
    assert_relative_eq!(bh.params[1], de.params[1], epsilon = 1e-4);
}
