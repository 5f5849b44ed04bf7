use mmfit_rs::bounds::PairBounds;
use mmfit_rs::data::NoiseModel;
use mmfit_rs::minimize::{minimize, LocalMethod, MinimizeOptions};
use mmfit_rs::model::MichaelisMenten;
use mmfit_rs::objective::{Loss, ModelObjective};
use ndarray::Array1;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::dataset;

fn random_start(bounds: &PairBounds, rng: &mut ChaCha8Rng) -> Array1<f64> {
    bounds
        .pairs()
        .iter()
        .map(|&(lo, hi)| rng.gen_range(lo..=hi))
        .collect()
}

fn assert_inside(params: &Array1<f64>, bounds: &PairBounds) {
    for (value, &(lo, hi)) in params.iter().zip(bounds.pairs()) {
        assert!(
            *value >= lo && *value <= hi,
            "{} outside [{}, {}]",
            value,
            lo,
            hi
        );
    }
}

#[test]
fn test_local_minimizer_never_leaves_the_box() {
    let data = dataset(NoiseModel::Relative(0.1), 3);
    let boxes = [
        // Contains the minimum
        PairBounds::new(vec![(0.0, 10.0), (0.0, 10.0)]).unwrap(),
        // Minimum lies outside, so bounds are active at the solution
        PairBounds::new(vec![(0.2, 1.0), (0.1, 0.3)]).unwrap(),
        PairBounds::new(vec![(0.001, 0.05), (0.8, 2.0)]).unwrap(),
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(2024);

    for loss in [Loss::SumOfSquares, Loss::SumOfAbsolute] {
        let objective = ModelObjective::new(&MichaelisMenten, &data, loss);
        for method in [LocalMethod::ProjectedBfgs, LocalMethod::NelderMead] {
            let options = MinimizeOptions::new(method);
            for bounds in &boxes {
                for _ in 0..10 {
                    let x0 = random_start(bounds, &mut rng);
                    let result = minimize(&objective, &x0, Some(bounds), &options).unwrap();
                    assert_inside(&result.params, bounds);
                }
            }
        }
    }
}

#[test]
fn test_start_on_the_boundary_stays_inside() {
    let data = dataset(NoiseModel::None, 0);
    let objective = ModelObjective::new(&MichaelisMenten, &data, Loss::SumOfSquares);
    let bounds = PairBounds::new(vec![(0.2, 1.0), (0.1, 0.3)]).unwrap();

    for method in [LocalMethod::ProjectedBfgs, LocalMethod::NelderMead] {
        for x0 in [vec![0.2, 0.1], vec![1.0, 0.3], vec![0.2, 0.3]] {
            let x0 = Array1::from_vec(x0);
            let result =
                minimize(&objective, &x0, Some(&bounds), &MinimizeOptions::new(method)).unwrap();
            assert_inside(&result.params, &bounds);
        }
    }
}
