use mmfit_rs::bounds::CurveFitBounds;
use mmfit_rs::curve_fit::{curve_fit, CurveFitOptions};
use mmfit_rs::data::{generate_seeded, geomspace, NoiseModel};
use mmfit_rs::model::MichaelisMenten;
use ndarray::array;

use crate::test_helpers::{true_params, KM, VMAX};

const NOISE: f64 = 0.1;

#[test]
fn test_recovers_parameters_under_relative_noise() {
    let grid = geomspace(0.01, 3.0, 50).unwrap();
    let bounds = CurveFitBounds::new(vec![0.0, 0.0], vec![10.0, 10.0]).unwrap();
    let options = CurveFitOptions::default();

    let mut km_sum = 0.0;
    let mut vmax_sum = 0.0;
    let trials = 20;
    for seed in 0..trials {
        let data = generate_seeded(
            &MichaelisMenten,
            &true_params(),
            &grid,
            NoiseModel::Relative(NOISE),
            seed,
        )
        .unwrap();

        let fit = curve_fit(&MichaelisMenten, &data, &array![1.0, 1.0], &bounds, &options).unwrap();
        assert!(fit.success(), "seed {}: {}", seed, fit.message);

        let km_err = (fit.params[0] - KM).abs() / KM;
        let vmax_err = (fit.params[1] - VMAX).abs() / VMAX;
        assert!(km_err < 3.0 * NOISE, "seed {}: km = {}", seed, fit.params[0]);
        assert!(vmax_err < 3.0 * NOISE, "seed {}: vmax = {}", seed, fit.params[1]);

        let errors = fit.std_errors();
        assert!(errors.iter().all(|e| e.is_finite() && *e > 0.0));

        km_sum += fit.params[0];
        vmax_sum += fit.params[1];
    }

    let km_mean = km_sum / trials as f64;
    let vmax_mean = vmax_sum / trials as f64;
    assert!((km_mean - KM).abs() / KM < NOISE);
    assert!((vmax_mean - VMAX).abs() / VMAX < NOISE);
}

#[test]
fn test_same_seed_gives_same_fit() {
    let grid = geomspace(0.01, 3.0, 12).unwrap();
    let options = CurveFitOptions::default();
    let bounds = CurveFitBounds::unbounded(2);

    let fits: Vec<_> = (0..2)
        .map(|_| {
            let data = generate_seeded(
                &MichaelisMenten,
                &true_params(),
                &grid,
                NoiseModel::Relative(NOISE),
                99,
            )
            .unwrap();
            curve_fit(&MichaelisMenten, &data, &array![1.0, 1.0], &bounds, &options).unwrap()
        })
        .collect();

    assert_eq!(fits[0].params, fits[1].params);
    assert_eq!(fits[0].covariance, fits[1].covariance);
}
