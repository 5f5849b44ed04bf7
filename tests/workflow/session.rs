use approx::assert_relative_eq;
use mmfit_rs::data::{Dataset, NoiseModel};
use mmfit_rs::global_opt::{BasinHopping, DifferentialEvolution};
use mmfit_rs::minimize::{LocalMethod, MinimizeOptions};
use mmfit_rs::model::MichaelisMenten;
use mmfit_rs::objective::Loss;
use mmfit_rs::{FitConfig, FitSession};
use ndarray::Array1;

use crate::test_helpers::{substrate, KM, VMAX};

fn fast_config() -> FitConfig {
    let mut config = FitConfig::default();
    config.basin_hopping = BasinHopping::new().with_niter(10);
    config.differential_evolution = DifferentialEvolution::new().with_max_iter(300);
    config
}

#[test]
fn test_default_session_on_noisy_data() {
    let session = FitSession::new(&MichaelisMenten, fast_config()).unwrap();
    assert_eq!(session.dataset().len(), 7);

    let report = session.run().unwrap();
    assert!(report.curve_fit.success(), "{}", report.curve_fit.message);

    // Every sum-of-squares adapter lands in the same basin as curve_fit
    for (label, params, loss, _) in report.estimates() {
        assert!(params.iter().all(|p| p.is_finite()), "{}", label);
        assert!(
            (params[1] - report.curve_fit.params[1]).abs() < 1e-3,
            "{}: {:?}",
            label,
            params
        );
        assert!(loss <= report.curve_fit.cost * (1.0 + 1e-4), "{}", label);
    }

    let table = report.to_string();
    assert!(table.contains("differential_evolution"));
    assert!(table.contains("basin_hopping"));
}

#[test]
fn test_sessions_are_independent() {
    let first = FitSession::new(&MichaelisMenten, fast_config()).unwrap();
    let second = FitSession::new(&MichaelisMenten, fast_config()).unwrap();
    assert_eq!(first.dataset(), second.dataset());

    let a = first.run_differential_evolution().unwrap();
    let b = second.run_differential_evolution().unwrap();
    assert_eq!(a, b);

    let mut other = fast_config();
    other.seed = 43;
    let third = FitSession::new(&MichaelisMenten, other).unwrap();
    assert_ne!(first.dataset(), third.dataset());
}

#[test]
fn test_config_file_drives_the_session() {
    let mut config = fast_config();
    config.noise = NoiseModel::None;
    config.loss = Loss::SumOfAbsolute;
    config.minimize = MinimizeOptions::new(LocalMethod::NelderMead);
    config.curve_points = 20;

    let path = std::env::temp_dir().join(format!("mmfit-config-{}.json", std::process::id()));
    std::fs::write(&path, config.to_json_string().unwrap()).unwrap();
    let loaded = FitConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.loss, Loss::SumOfAbsolute);
    assert_eq!(loaded.minimize.method, LocalMethod::NelderMead);
    let session = FitSession::new(&MichaelisMenten, loaded).unwrap();
    let local = session.run_minimize().unwrap();
    assert_relative_eq!(local.params[0], KM, epsilon = 5e-3);
    assert_relative_eq!(local.params[1], VMAX, epsilon = 5e-3);
    assert_eq!(session.curve_grid().len(), 20);
}

#[test]
fn test_absolute_loss_resists_an_outlier() {
    let s = substrate();
    let mut v: Array1<f64> = s.mapv(|s| VMAX * s / (KM + s));
    v[5] *= 3.0;
    let data = Dataset::new(s, v).unwrap();

    let mut squares = fast_config();
    squares.loss = Loss::SumOfSquares;
    let mut absolute = fast_config();
    absolute.loss = Loss::SumOfAbsolute;

    let ssr = FitSession::with_dataset(&MichaelisMenten, squares, data.clone())
        .unwrap()
        .run_differential_evolution()
        .unwrap();
    let sad = FitSession::with_dataset(&MichaelisMenten, absolute, data)
        .unwrap()
        .run_differential_evolution()
        .unwrap();

    let ssr_err = (ssr.params[1] - VMAX).abs();
    let sad_err = (sad.params[1] - VMAX).abs();
    assert!(sad_err < ssr_err, "sad {} vs ssr {}", sad_err, ssr_err);
    assert!(sad_err < 0.05);
}

#[test]
fn test_measured_session_has_no_truth_curve() {
    let s = substrate();
    let v = s.mapv(|s| VMAX * s / (KM + s));
    let data = Dataset::new(s, v).unwrap();

    let session = FitSession::with_dataset(&MichaelisMenten, fast_config(), data).unwrap();
    let report = session.run().unwrap();
    assert!(report.truth.is_none());
    assert_eq!(report.curves.len(), 4);
    assert_relative_eq!(report.curve_fit.params[0], KM, epsilon = 1e-6);
}
