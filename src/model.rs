//! Rate-law models.
//!
//! This module defines the [`RateModel`] trait, a pure mapping from an
//! independent variable and a parameter vector to a predicted rate, and the
//! Michaelis-Menten model `v = vmax * s / (km + s)`.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result};

/// Michaelis-Menten rate for a single substrate concentration.
///
/// Returns a non-finite value when `km + s == 0`.
///
/// ```
/// use mmfit_rs::model::michaelis_menten;
///
/// assert_eq!(michaelis_menten(0.1, 0.1, 0.5), 0.25);
/// ```
pub fn michaelis_menten(s: f64, km: f64, vmax: f64) -> f64 {
    vmax * s / (km + s)
}

/// Michaelis-Menten rate evaluated elementwise over `s`.
pub fn michaelis_menten_array(s: &Array1<f64>, km: f64, vmax: f64) -> Array1<f64> {
    s.mapv(|s| michaelis_menten(s, km, vmax))
}

/// A model that can be fit to (x, y) data.
///
/// Implementations must be pure: the same `x` and `params` always produce the
/// same value, and no state is kept between calls.
pub trait RateModel: Sync {
    /// Names of the free parameters, in parameter-vector order.
    fn param_names(&self) -> &[&'static str];

    /// Number of free parameters.
    fn param_count(&self) -> usize {
        self.param_names().len()
    }

    /// Evaluate the model at a single point.
    ///
    /// This is the unchecked kernel behind [`eval`](RateModel::eval): it
    /// must not panic, and should return NaN when `params` does not have
    /// [`param_count`](RateModel::param_count) entries.
    fn eval_point(&self, x: f64, params: &[f64]) -> f64;

    /// Evaluate the model elementwise over `x`.
    ///
    /// Fails with [`FitError::DimensionMismatch`] if `params` has the wrong
    /// length and with [`FitError::ModelEvaluation`] if any prediction is NaN
    /// or infinite.
    fn eval(&self, x: &Array1<f64>, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_params(params)?;
        let p = params.as_slice().ok_or_else(|| {
            FitError::InvalidInput("parameter vector is not contiguous".to_string())
        })?;

        let y = x.mapv(|xi| self.eval_point(xi, p));
        if let Some(index) = y.iter().position(|v| !v.is_finite()) {
            return Err(FitError::ModelEvaluation(format!(
                "non-finite prediction {} at x[{}] = {} with parameters {:?}",
                y[index], index, x[index], p
            )));
        }
        Ok(y)
    }

    /// Jacobian of the predictions: `J[i, j] = d f(x_i) / d p_j`.
    ///
    /// The default uses forward finite differences.
    fn jacobian(&self, x: &Array1<f64>, params: &Array1<f64>) -> Result<Array2<f64>> {
        self.check_params(params)?;
        crate::utils::finite_difference::jacobian(|p| self.eval(x, p), params, None)
    }

    /// Check that `params` has the right number of entries.
    fn check_params(&self, params: &Array1<f64>) -> Result<()> {
        if params.len() != self.param_count() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters ({}), got {}",
                self.param_count(),
                self.param_names().join(", "),
                params.len()
            )));
        }
        Ok(())
    }
}

/// The Michaelis-Menten model with parameter order `[km, vmax]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MichaelisMenten;

impl MichaelisMenten {
    pub fn new() -> Self {
        Self
    }
}

impl RateModel for MichaelisMenten {
    fn param_names(&self) -> &[&'static str] {
        &["km", "vmax"]
    }

    fn eval_point(&self, x: f64, params: &[f64]) -> f64 {
        match params {
            [km, vmax] => michaelis_menten(x, *km, *vmax),
            _ => f64::NAN,
        }
    }

    fn jacobian(&self, x: &Array1<f64>, params: &Array1<f64>) -> Result<Array2<f64>> {
        self.check_params(params)?;
        let (km, vmax) = (params[0], params[1]);

        let mut jac = Array2::zeros((x.len(), 2));
        for (i, &s) in x.iter().enumerate() {
            let denom = km + s;
            if denom == 0.0 {
                return Err(FitError::ModelEvaluation(format!(
                    "km + s vanishes at x[{}] = {} with km = {}",
                    i, s, km
                )));
            }
            // dv/dkm = -vmax s / (km + s)^2, dv/dvmax = s / (km + s)
            jac[[i, 0]] = -vmax * s / (denom * denom);
            jac[[i, 1]] = s / denom;
        }
        Ok(jac)
    }
}
