use mmfit_rs::data::NoiseModel;
use mmfit_rs::model::MichaelisMenten;
use mmfit_rs::objective::{Loss, ModelObjective, Objective};
use ndarray::array;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::{dataset, exact_dataset, true_params};

#[test]
fn test_objective_is_non_negative() {
    let data = dataset(NoiseModel::Relative(0.1), 5);
    let mut rng = ChaCha8Rng::seed_from_u64(1);

    for loss in [Loss::SumOfSquares, Loss::SumOfAbsolute] {
        let objective = ModelObjective::new(&MichaelisMenten, &data, loss);
        for _ in 0..500 {
            // km stays positive so km + s never vanishes
            let params = array![rng.gen_range(1e-6..20.0), rng.gen_range(-20.0..20.0)];
            let value = objective.value(&params).unwrap();
            assert!(value >= 0.0, "{} gave {} at {:?}", loss, value, params);
        }
    }
}

#[test]
fn test_zero_noise_loss_vanishes_at_truth() {
    let data = exact_dataset();

    for loss in [Loss::SumOfSquares, Loss::SumOfAbsolute] {
        let objective = ModelObjective::new(&MichaelisMenten, &data, loss);
        let at_truth = objective.value(&true_params()).unwrap();
        assert!(at_truth < 1e-8, "{} at truth: {}", loss, at_truth);

        let far = objective.value(&array![1.0, 5.0]).unwrap();
        assert!(far > 0.01, "{} far from truth: {}", loss, far);
    }
}

#[test]
fn test_objective_rejects_wrong_parameter_count() {
    let data = exact_dataset();
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    assert!(objective.value(&array![0.1]).is_err());
    assert!(objective.value(&array![0.1, 0.5, 1.0]).is_err());
}
