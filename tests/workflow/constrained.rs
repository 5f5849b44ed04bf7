use approx::assert_relative_eq;
use mmfit_rs::bounds::PairBounds;
use mmfit_rs::data::NoiseModel;
use mmfit_rs::global_opt::BasinHopping;
use mmfit_rs::minimize::{minimize, Constraint, LocalMethod, MinimizeOptions};
use mmfit_rs::model::MichaelisMenten;
use mmfit_rs::objective::{Loss, ModelObjective};
use mmfit_rs::FitError;
use ndarray::array;

use crate::test_helpers::dataset;

fn box_bounds() -> PairBounds {
    PairBounds::new(vec![(0.0, 10.0), (0.0, 10.0)]).unwrap()
}

#[test]
fn test_fixed_vmax_through_an_equality_constraint() {
    let data = dataset(NoiseModel::Relative(0.1), 6);
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let options = MinimizeOptions::default().with_constraint(Constraint::eq(|p| p[1] - 0.6));

    let result = minimize(&objective, &array![1.0, 1.0], Some(&box_bounds()), &options).unwrap();
    assert!(result.success(), "{}", result.message);
    assert_relative_eq!(result.params[1], 0.6, epsilon = 1e-5);
}

#[test]
fn test_km_cap_through_an_inequality_constraint() {
    let data = dataset(NoiseModel::Relative(0.1), 6);
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let options =
        MinimizeOptions::default().with_constraint(Constraint::ineq(|p| 0.05 - p[0]));

    let result = minimize(&objective, &array![0.01, 1.0], Some(&box_bounds()), &options).unwrap();
    assert!(result.success(), "{}", result.message);
    assert!(result.params[0] <= 0.05 + 1e-5);
}

#[test]
fn test_constraints_inside_basin_hopping() {
    let data = dataset(NoiseModel::Relative(0.1), 6);
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let local = MinimizeOptions::default().with_constraint(Constraint::eq(|p| p[1] - 0.6));

    let result = BasinHopping::new()
        .with_niter(5)
        .with_seed(3)
        .with_local_options(local)
        .minimize(&objective, &array![1.0, 1.0], Some(&box_bounds()))
        .unwrap();
    assert_relative_eq!(result.params[1], 0.6, epsilon = 1e-4);
}

#[test]
fn test_nelder_mead_rejects_constraints_up_front() {
    let data = dataset(NoiseModel::None, 0);
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let options = MinimizeOptions::new(LocalMethod::NelderMead)
        .with_constraint(Constraint::ineq(|p| p[0]));

    let err = minimize(&objective, &array![1.0, 1.0], None, &options).unwrap_err();
    assert!(matches!(err, FitError::InvalidConfig(_)));
}
