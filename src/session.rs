//! A complete fitting session driven by one configuration.
//!
//! [`FitSession`] owns everything a run needs (the dataset, the bounds, the
//! initial guess and the settings of every adapter), so independent sessions
//! never share state. [`FitSession::run`] fits the same data with the
//! curve-fit, local, basin-hopping and differential-evolution adapters and
//! collects the results together with `(x, y)` curves for plotting.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::bounds::{CurveFitBounds, Interval, PairBounds};
use crate::curve_fit::{curve_fit, CurveFitOptions, CurveFitResult};
use crate::data::{generate_seeded, linspace, Curve, Dataset, NoiseModel};
use crate::error::{FitError, Result};
use crate::global_opt::{BasinHopping, DifferentialEvolution};
use crate::minimize::{minimize, MinimizeOptions};
use crate::model::RateModel;
use crate::objective::{Loss, ModelObjective, NonFinitePolicy};
use crate::result::OptimizationResult;

/// Configuration of a [`FitSession`].
///
/// Every field has a default, so a JSON document only needs the values it
/// changes.
///
/// ```
/// use mmfit_rs::session::FitConfig;
///
/// let config = FitConfig::from_json_str(r#"{ "seed": 7, "loss": "sum_of_absolute" }"#).unwrap();
/// assert_eq!(config.seed, 7);
/// assert_eq!(config.true_params, vec![0.1, 0.5]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Parameters used to generate synthetic observations
    pub true_params: Vec<f64>,

    /// Substrate concentrations at which observations are generated
    pub substrate: Vec<f64>,

    /// Noise added to the synthetic observations
    pub noise: NoiseModel,

    /// Loss used by the scalar-objective adapters
    pub loss: Loss,

    /// What the scalar objective does with non-finite model output
    pub non_finite: NonFinitePolicy,

    /// Starting point for curve fitting, local search and basin hopping
    pub initial_guess: Vec<f64>,

    /// One interval per parameter; `null` ends are unbounded
    pub bounds: Vec<Interval>,

    pub curve_fit: CurveFitOptions,
    pub minimize: MinimizeOptions,
    pub basin_hopping: BasinHopping,
    pub differential_evolution: DifferentialEvolution,

    /// Number of points in every reported curve
    pub curve_points: usize,

    /// Seed for the synthetic data and for global optimizers without their own seed
    pub seed: u64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            true_params: vec![0.1, 0.5],
            substrate: vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 3.0],
            noise: NoiseModel::Relative(0.1),
            loss: Loss::SumOfSquares,
            non_finite: NonFinitePolicy::Propagate,
            initial_guess: vec![1.0, 1.0],
            bounds: vec![Interval { min: 0.0, max: 10.0 }; 2],
            curve_fit: CurveFitOptions::default(),
            minimize: MinimizeOptions::default(),
            basin_hopping: BasinHopping::default(),
            differential_evolution: DifferentialEvolution::default(),
            curve_points: 100,
            seed: 42,
        }
    }
}

impl FitConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Bounds in the curve-fit convention.
    pub fn curve_fit_bounds(&self) -> Result<CurveFitBounds> {
        let lower = self.bounds.iter().map(|b| b.min).collect();
        let upper = self.bounds.iter().map(|b| b.max).collect();
        Ok(CurveFitBounds::new(lower, upper)?)
    }

    /// Bounds in the minimizer convention.
    pub fn pair_bounds(&self) -> Result<PairBounds> {
        Ok(PairBounds::new(
            self.bounds.iter().map(|b| (b.min, b.max)).collect(),
        )?)
    }

    /// Check that every per-parameter vector has `n_params` entries.
    pub fn validate(&self, n_params: usize) -> Result<()> {
        for (name, len) in [
            ("true_params", self.true_params.len()),
            ("initial_guess", self.initial_guess.len()),
            ("bounds", self.bounds.len()),
        ] {
            if len != n_params {
                return Err(FitError::DimensionMismatch(format!(
                    "{} has {} entries but the model has {} parameters",
                    name, len, n_params
                )));
            }
        }
        if self.curve_points < 2 {
            return Err(FitError::InvalidConfig(format!(
                "curve_points must be at least 2, got {}",
                self.curve_points
            )));
        }
        self.curve_fit.lm.validate()?;
        self.minimize.validate(n_params)?;
        Ok(())
    }
}

/// Everything produced by [`FitSession::run`].
#[derive(Debug, Clone)]
pub struct FitReport {
    pub curve_fit: CurveFitResult,
    pub local: OptimizationResult,
    pub basin_hopping: OptimizationResult,
    pub differential_evolution: OptimizationResult,

    /// The generating model (synthetic sessions only)
    pub truth: Option<Curve>,

    /// `(label, curve)` for every adapter, in the order above
    pub curves: Vec<(String, Curve)>,
}

impl FitReport {
    /// `(label, params, loss, success)` for every adapter.
    pub fn estimates(&self) -> Vec<(&'static str, &Array1<f64>, f64, bool)> {
        vec![
            (
                "curve_fit",
                &self.curve_fit.params,
                self.curve_fit.cost,
                self.curve_fit.success(),
            ),
            ("minimize", &self.local.params, self.local.fun, self.local.success()),
            (
                "basin_hopping",
                &self.basin_hopping.params,
                self.basin_hopping.fun,
                self.basin_hopping.success(),
            ),
            (
                "differential_evolution",
                &self.differential_evolution.params,
                self.differential_evolution.fun,
                self.differential_evolution.success(),
            ),
        ]
    }
}

impl fmt::Display for FitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<24} {:>24} {:>12} {:>8}", "method", "params", "loss", "ok")?;
        for (label, params, loss, ok) in self.estimates() {
            let params: Vec<String> = params.iter().map(|p| format!("{:.4}", p)).collect();
            writeln!(
                f,
                "{:<24} {:>24} {:>12.4e} {:>8}",
                label,
                params.join(", "),
                loss,
                ok
            )?;
        }
        Ok(())
    }
}

/// One fitting session: a model, a dataset and a configuration.
pub struct FitSession<'a, M: ?Sized> {
    model: &'a M,
    config: FitConfig,
    dataset: Dataset,
    synthetic: bool,
}

impl<'a, M: RateModel + ?Sized> FitSession<'a, M> {
    /// Create a session on synthetic data generated from `config`.
    pub fn new(model: &'a M, config: FitConfig) -> Result<Self> {
        config.validate(model.param_count())?;
        let grid = Array1::from_vec(config.substrate.clone());
        let true_params = Array1::from_vec(config.true_params.clone());
        let dataset = generate_seeded(model, &true_params, &grid, config.noise, config.seed)?;
        log::debug!(
            "generated {} observations with {:?} noise (seed {})",
            dataset.len(),
            config.noise,
            config.seed
        );
        Ok(Self {
            model,
            config,
            dataset,
            synthetic: true,
        })
    }

    /// Create a session on measured data; `true_params` is ignored.
    pub fn with_dataset(model: &'a M, config: FitConfig, dataset: Dataset) -> Result<Self> {
        let mut config = config;
        config.true_params = vec![0.0; model.param_count()];
        config.validate(model.param_count())?;
        Ok(Self {
            model,
            config,
            dataset,
            synthetic: false,
        })
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn objective(&self) -> ModelObjective<'_, M> {
        ModelObjective::new(self.model, &self.dataset, self.config.loss)
            .with_policy(self.config.non_finite)
    }

    fn initial_guess(&self) -> Array1<f64> {
        Array1::from_vec(self.config.initial_guess.clone())
    }

    pub fn run_curve_fit(&self) -> Result<CurveFitResult> {
        let bounds = self.config.curve_fit_bounds()?;
        curve_fit(
            self.model,
            &self.dataset,
            &self.initial_guess(),
            &bounds,
            &self.config.curve_fit,
        )
    }

    pub fn run_minimize(&self) -> Result<OptimizationResult> {
        let bounds = self.config.pair_bounds()?;
        minimize(
            &self.objective(),
            &self.initial_guess(),
            Some(&bounds),
            &self.config.minimize,
        )
    }

    pub fn run_basin_hopping(&self) -> Result<OptimizationResult> {
        let bounds = self.config.pair_bounds()?;
        let mut bh = self.config.basin_hopping.clone();
        if bh.seed.is_none() {
            bh.seed = Some(self.config.seed);
        }
        bh.minimize(&self.objective(), &self.initial_guess(), Some(&bounds))
    }

    pub fn run_differential_evolution(&self) -> Result<OptimizationResult> {
        let bounds = self.config.pair_bounds()?;
        let mut de = self.config.differential_evolution.clone();
        if de.seed.is_none() {
            de.seed = Some(self.config.seed);
        }
        de.minimize(&self.objective(), &bounds)
    }

    /// Grid spanning the observed substrate range, for curves.
    pub fn curve_grid(&self) -> Array1<f64> {
        let x = self.dataset.x();
        let lo = x.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        linspace(lo, hi, self.config.curve_points)
    }

    /// Run every adapter on the session's data.
    pub fn run(&self) -> Result<FitReport> {
        let curve_fit = self.run_curve_fit()?;
        let local = self.run_minimize()?;
        let basin_hopping = self.run_basin_hopping()?;
        let differential_evolution = self.run_differential_evolution()?;

        let grid = self.curve_grid();
        let truth = if self.synthetic {
            let true_params = Array1::from_vec(self.config.true_params.clone());
            Some(Curve::from_model(self.model, &true_params, &grid)?)
        } else {
            None
        };

        let mut curves = Vec::with_capacity(4);
        for (label, params) in [
            ("curve_fit", &curve_fit.params),
            ("minimize", &local.params),
            ("basin_hopping", &basin_hopping.params),
            ("differential_evolution", &differential_evolution.params),
        ] {
            curves.push((label.to_string(), Curve::from_model(self.model, params, &grid)?));
        }

        let report = FitReport {
            curve_fit,
            local,
            basin_hopping,
            differential_evolution,
            truth,
            curves,
        };
        log::info!("fitting session finished\n{}", report);
        Ok(report)
    }
}
