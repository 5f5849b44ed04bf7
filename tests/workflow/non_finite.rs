use mmfit_rs::bounds::PairBounds;
use mmfit_rs::data::Dataset;
use mmfit_rs::global_opt::{BasinHopping, DifferentialEvolution};
use mmfit_rs::minimize::{minimize, MinimizeOptions};
use mmfit_rs::model::MichaelisMenten;
use mmfit_rs::objective::{Loss, ModelObjective, NonFinitePolicy};
use mmfit_rs::FitError;
use ndarray::{array, Array1};

use crate::test_helpers::{substrate, KM, VMAX};

const PENALTY: f64 = 1e6;

/// Exact data including s = 0, where km = 0 gives 0 / 0.
fn data_with_zero_substrate() -> Dataset {
    let s: Array1<f64> = std::iter::once(0.0).chain(substrate().iter().copied()).collect();
    let v = s.mapv(|s| VMAX * s / (KM + s));
    Dataset::new(s, v).unwrap()
}

/// A box whose km = 0 face lies outside the model's domain.
fn box_bounds() -> PairBounds {
    PairBounds::new(vec![(0.0, 1.0), (0.0, 2.0)]).unwrap()
}

#[test]
fn test_start_on_singular_face_needs_a_penalty() {
    let data = data_with_zero_substrate();
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let corner = array![0.0, 1.0];

    let err = minimize(&objective, &corner, Some(&box_bounds()), &MinimizeOptions::default())
        .unwrap_err();
    assert!(matches!(err, FitError::ModelEvaluation(_)));

    let penalized = objective.with_policy(NonFinitePolicy::Penalty(PENALTY));
    let result = minimize(
        &penalized,
        &corner,
        Some(&box_bounds()),
        &MinimizeOptions::default(),
    )
    .unwrap();
    assert!(result.fun <= PENALTY);
}

#[test]
fn test_basin_hopping_with_penalty_leaves_the_singular_face() {
    let data = data_with_zero_substrate();
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares)
        .with_policy(NonFinitePolicy::Penalty(PENALTY));

    // Hops are clipped onto km = 0 whenever the perturbation overshoots
    let result = BasinHopping::new()
        .with_niter(20)
        .with_step_size(0.5)
        .with_seed(11)
        .minimize(&objective, &array![0.0, 1.0], Some(&box_bounds()))
        .unwrap();

    assert!(result.fun < PENALTY);
    assert!(result.fun < 1e-6, "{}", result);
    assert!((result.params[0] - KM).abs() < 1e-2, "{}", result);
    assert!((result.params[1] - VMAX).abs() < 1e-2, "{}", result);
}

#[test]
fn test_differential_evolution_over_a_singular_box() {
    let data = data_with_zero_substrate();
    for policy in [NonFinitePolicy::Propagate, NonFinitePolicy::Penalty(PENALTY)] {
        let objective =
            ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares).with_policy(policy);
        let result = DifferentialEvolution::new()
            .with_seed(11)
            .with_max_iter(300)
            .minimize(&objective, &box_bounds())
            .unwrap();

        assert!(result.fun < 1e-6, "{:?}: {}", policy, result);
        assert!((result.params[0] - KM).abs() < 1e-2, "{:?}: {}", policy, result);
    }
}
