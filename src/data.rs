//! Observations, synthetic data and prediction curves.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::model::RateModel;

/// Paired independent-variable values and observations.
///
/// Observation `y[i]` belongs to input `x[i]`. A dataset is validated once
/// at construction and cannot be modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array1<f64>,
    y: Array1<f64>,
}

impl Dataset {
    /// Create a dataset, checking that `x` and `y` are non-empty, of equal
    /// length and finite.
    pub fn new(x: Array1<f64>, y: Array1<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Dataset has {} inputs but {} observations",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(FitError::InvalidInput("Dataset is empty".to_string()));
        }
        if let Some(i) = x.iter().chain(y.iter()).position(|v| !v.is_finite()) {
            return Err(FitError::InvalidInput(format!(
                "Dataset contains a non-finite value at position {}",
                i % x.len()
            )));
        }
        Ok(Self { x, y })
    }

    /// Independent-variable values.
    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    /// Observed values.
    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// How noise is added to synthetic observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "scale", rename_all = "snake_case")]
pub enum NoiseModel {
    /// Exact model values.
    None,

    /// Zero-mean Gaussian noise with a fixed standard deviation.
    Absolute(f64),

    /// Zero-mean Gaussian noise with standard deviation `scale * |model(x)|`.
    Relative(f64),
}

impl Default for NoiseModel {
    fn default() -> Self {
        NoiseModel::Relative(0.1)
    }
}

impl NoiseModel {
    fn scale_at(&self, value: f64) -> f64 {
        match *self {
            NoiseModel::None => 0.0,
            NoiseModel::Absolute(sigma) => sigma,
            NoiseModel::Relative(fraction) => fraction * value.abs(),
        }
    }
}

/// Generate noisy observations `model(grid, true_params) + noise`.
///
/// Noise is drawn independently for every point from the injected `rng`.
pub fn generate<M, R>(
    model: &M,
    true_params: &Array1<f64>,
    grid: &Array1<f64>,
    noise: NoiseModel,
    rng: &mut R,
) -> Result<Dataset>
where
    M: RateModel + ?Sized,
    R: Rng + ?Sized,
{
    let exact = model.eval(grid, true_params)?;

    let observed = match noise {
        NoiseModel::None => exact,
        _ => {
            let mut observed = exact;
            for value in observed.iter_mut() {
                let sigma = noise.scale_at(*value);
                if sigma > 0.0 {
                    let normal = Normal::new(0.0, sigma).map_err(|e| {
                        FitError::InvalidInput(format!("Invalid noise scale {}: {}", sigma, e))
                    })?;
                    *value += normal.sample(rng);
                } else if sigma < 0.0 || sigma.is_nan() {
                    return Err(FitError::InvalidInput(format!(
                        "Noise scale must be non-negative, got {}",
                        sigma
                    )));
                }
            }
            observed
        }
    };

    Dataset::new(grid.clone(), observed)
}

/// [`generate`] with a `StdRng` seeded from `seed`.
pub fn generate_seeded<M>(
    model: &M,
    true_params: &Array1<f64>,
    grid: &Array1<f64>,
    noise: NoiseModel,
    seed: u64,
) -> Result<Dataset>
where
    M: RateModel + ?Sized,
{
    let mut rng = StdRng::seed_from_u64(seed);
    generate(model, true_params, grid, noise, &mut rng)
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Array1<f64> {
    Array1::linspace(start, stop, n)
}

/// `n` values from `start` to `stop` inclusive, evenly spaced on a log scale.
///
/// Both ends must be positive.
pub fn geomspace(start: f64, stop: f64, n: usize) -> Result<Array1<f64>> {
    if !(start > 0.0 && stop > 0.0) {
        return Err(FitError::InvalidInput(format!(
            "geomspace needs positive ends, got {} and {}",
            start, stop
        )));
    }
    Ok(Array1::linspace(start.ln(), stop.ln(), n).mapv(f64::exp))
}

/// Model predictions over an input grid, ready for an external plotter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Curve {
    /// Evaluate `model` with `params` over `grid`.
    pub fn from_model<M: RateModel + ?Sized>(
        model: &M,
        params: &Array1<f64>,
        grid: &Array1<f64>,
    ) -> Result<Self> {
        let y = model.eval(grid, params)?;
        Ok(Self {
            x: grid.to_vec(),
            y: y.to_vec(),
        })
    }

    /// The curve as `(x, y)` points.
    pub fn points(&self) -> Vec<(f64, f64)> {
        self.x.iter().copied().zip(self.y.iter().copied()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MichaelisMenten;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_dataset_validation() {
        assert!(Dataset::new(array![1.0, 2.0], array![1.0, 2.0]).is_ok());
        assert!(matches!(
            Dataset::new(array![1.0, 2.0], array![1.0]),
            Err(FitError::DimensionMismatch(_))
        ));
        assert!(matches!(
            Dataset::new(array![], array![]),
            Err(FitError::InvalidInput(_))
        ));
        assert!(matches!(
            Dataset::new(array![1.0, f64::NAN], array![1.0, 2.0]),
            Err(FitError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_noise_free_generation_is_exact() {
        let grid = array![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 3.0];
        let params = array![0.1, 0.5];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let data = generate(&MichaelisMenten, &params, &grid, NoiseModel::None, &mut rng).unwrap();
        for (x, y) in data.x().iter().zip(data.y().iter()) {
            assert_relative_eq!(*y, 0.5 * x / (0.1 + x));
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let grid = linspace(0.01, 3.0, 20);
        let params = array![0.1, 0.5];
        let a = generate_seeded(&MichaelisMenten, &params, &grid, NoiseModel::Relative(0.1), 42)
            .unwrap();
        let b = generate_seeded(&MichaelisMenten, &params, &grid, NoiseModel::Relative(0.1), 42)
            .unwrap();
        let c = generate_seeded(&MichaelisMenten, &params, &grid, NoiseModel::Relative(0.1), 43)
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_negative_noise_rejected() {
        let grid = array![1.0];
        let params = array![0.1, 0.5];
        let result =
            generate_seeded(&MichaelisMenten, &params, &grid, NoiseModel::Absolute(-1.0), 1);
        assert!(matches!(result, Err(FitError::InvalidInput(_))));
    }

    #[test]
    fn test_geomspace() {
        let g = geomspace(0.01, 100.0, 5).unwrap();
        assert_relative_eq!(g[0], 0.01, epsilon = 1e-12);
        assert_relative_eq!(g[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(g[4], 100.0, epsilon = 1e-9);
        assert!(geomspace(0.0, 1.0, 3).is_err());
    }

    #[test]
    fn test_curve_from_model() {
        let grid = linspace(0.0, 2.0, 3);
        let curve = Curve::from_model(&MichaelisMenten, &array![1.0, 2.0], &grid).unwrap();
        assert_eq!(curve.points(), vec![(0.0, 0.0), (1.0, 1.0), (2.0, 4.0 / 3.0)]);
    }
}
