//! # mmfit-rs
//!
//! `mmfit-rs` estimates the parameters of the Michaelis-Menten rate law
//! `v = vmax * s / (km + s)` from (substrate, rate) observations, and shows
//! how least-squares curve fitting relates to general scalar minimization.
//!
//! The library provides:
//! - The forward model and a seeded synthetic-data generator
//! - Sum-of-squares and sum-of-absolute-deviation objectives
//! - A Levenberg-Marquardt curve-fit adapter with parameter covariance
//! - A bounded local minimizer (projected BFGS or Nelder-Mead) with optional
//!   equality/inequality constraints
//! - Basin-hopping and differential-evolution global minimizers
//! - Both bounds conventions (`(lowers, uppers)` and `(lo, hi)` pairs) with an
//!   exact conversion between them
//!
//! Failures to converge and infeasible bounds are reported through
//! [`Status`] on the returned result; inspect it before trusting the
//! parameters.
//!
//! ## Basic Usage
//!
//! ```
//! use mmfit_rs::bounds::CurveFitBounds;
//! use mmfit_rs::curve_fit::{curve_fit, CurveFitOptions};
//! use mmfit_rs::data::{generate_seeded, NoiseModel};
//! use mmfit_rs::model::MichaelisMenten;
//! use ndarray::array;
//!
//! let s = array![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 3.0];
//! let data = generate_seeded(&MichaelisMenten, &array![0.1, 0.5], &s, NoiseModel::None, 0)?;
//!
//! let bounds = CurveFitBounds::new(vec![0.0, 0.0], vec![10.0, 10.0])?;
//! let options = CurveFitOptions::default();
//! let fit = curve_fit(&MichaelisMenten, &data, &array![1.0, 1.0], &bounds, &options)?;
//! assert!(fit.success());
//! assert!((fit.params[0] - 0.1).abs() < 1e-6);
//! # Ok::<(), mmfit_rs::FitError>(())
//! ```

pub mod bounds;
pub mod curve_fit;
pub mod data;
pub mod error;
pub mod global_opt;
pub mod lm;
pub mod minimize;
pub mod model;
pub mod objective;
pub mod problem;
pub mod result;
pub mod session;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use bounds::{CurveFitBounds, Interval, PairBounds};
pub use curve_fit::{curve_fit, CurveFitOptions, CurveFitResult};
pub use data::{Curve, Dataset, NoiseModel};
pub use error::{FitError, Result};
pub use global_opt::{BasinHopping, DifferentialEvolution};
pub use lm::LevenbergMarquardt;
pub use minimize::{minimize, Constraint, LocalMethod, MinimizeOptions};
pub use model::{michaelis_menten, MichaelisMenten, RateModel};
pub use objective::{FnObjective, Loss, ModelObjective, Objective};
pub use problem::Problem;
pub use result::{OptimizationResult, Status};
pub use session::{FitConfig, FitReport, FitSession};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
