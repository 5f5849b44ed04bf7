use mmfit_rs::bounds::{CurveFitBounds, PairBounds};
use mmfit_rs::curve_fit::{curve_fit, CurveFitOptions};
use mmfit_rs::minimize::{minimize, MinimizeOptions};
use mmfit_rs::model::MichaelisMenten;
use mmfit_rs::objective::{Loss, ModelObjective};
use mmfit_rs::result::Status;
use ndarray::array;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::exact_dataset;

fn inside_curve_fit(bounds: &CurveFitBounds, x: &[f64]) -> bool {
    bounds
        .intervals()
        .iter()
        .zip(x.iter())
        .all(|(interval, &v)| interval.contains(v))
}

#[test]
fn test_conversion_round_trips_exactly() {
    let lower = vec![0.0, -1.5, f64::NEG_INFINITY, 1e-300];
    let upper = vec![10.0, 0.1 + 0.2, 4.0, f64::INFINITY];
    let curve_fit_bounds = CurveFitBounds::new(lower.clone(), upper.clone()).unwrap();

    let pairs = curve_fit_bounds.to_pairs();
    assert_eq!(pairs.pairs()[1], (-1.5, 0.1 + 0.2));
    assert_eq!(pairs.to_curve_fit(), curve_fit_bounds);
    assert_eq!(pairs.to_curve_fit().lower(), lower.as_slice());
    assert_eq!(pairs.to_curve_fit().upper(), upper.as_slice());

    let pair_bounds = PairBounds::new(vec![(0.0, 1.0), (2.0, 2.0)]).unwrap();
    assert_eq!(pair_bounds.to_curve_fit().to_pairs(), pair_bounds);
    assert_eq!(PairBounds::from(&CurveFitBounds::from(&pair_bounds)), pair_bounds);
}

#[test]
fn test_both_conventions_describe_the_same_box() {
    let curve_fit_bounds = CurveFitBounds::new(vec![0.0, 0.2], vec![1.0, 0.4]).unwrap();
    let pair_bounds = curve_fit_bounds.to_pairs();
    let mut rng = ChaCha8Rng::seed_from_u64(77);

    for _ in 0..1000 {
        let x = [rng.gen_range(-0.5..1.5), rng.gen_range(0.0..0.6)];
        assert_eq!(
            inside_curve_fit(&curve_fit_bounds, &x),
            pair_bounds.infeasibility(&x).is_none(),
            "disagreement at {:?}",
            x
        );
    }
    // The ends belong to both regions
    assert!(inside_curve_fit(&curve_fit_bounds, &[1.0, 0.2]));
    assert!(pair_bounds.infeasibility(&[1.0, 0.2]).is_none());
}

#[test]
fn test_both_adapters_accept_the_converted_box() {
    let data = exact_dataset();
    let curve_fit_bounds = CurveFitBounds::new(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
    let pair_bounds = curve_fit_bounds.to_pairs();
    let x0 = array![1.0, 1.0];

    let fit = curve_fit(
        &MichaelisMenten,
        &data,
        &x0,
        &curve_fit_bounds,
        &CurveFitOptions::default(),
    )
    .unwrap();
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let local = minimize(&objective, &x0, Some(&pair_bounds), &MinimizeOptions::default()).unwrap();

    assert!(fit.success());
    assert!(local.success());
    assert!((fit.params[0] - local.params[0]).abs() < 1e-4);
    assert!((fit.params[1] - local.params[1]).abs() < 1e-4);
}

#[test]
fn test_infeasible_start_is_reported_by_both_adapters() {
    let data = exact_dataset();
    let curve_fit_bounds = CurveFitBounds::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
    let x0 = array![2.0, 0.5];

    let fit = curve_fit(
        &MichaelisMenten,
        &data,
        &x0,
        &curve_fit_bounds,
        &CurveFitOptions::default(),
    )
    .unwrap();
    assert_eq!(fit.status, Status::BoundsInfeasible);

    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let local = minimize(
        &objective,
        &x0,
        Some(&curve_fit_bounds.to_pairs()),
        &MinimizeOptions::default(),
    )
    .unwrap();
    assert_eq!(local.status, Status::BoundsInfeasible);
}
