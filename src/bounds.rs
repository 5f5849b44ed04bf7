//! Parameter bounds in the two conventions used by the fitting adapters.
//!
//! The curve-fit adapter takes bounds as two parallel sequences
//! (`([lower...], [upper...])`, see [`CurveFitBounds`]), while the local and
//! global minimizers take one `(lower, upper)` pair per parameter
//! ([`PairBounds`]). The two shapes are kept as distinct types on purpose:
//! passing one where the other is expected is a compile error, and the only
//! way across is an explicit conversion which round-trips exactly.
//!
//! This module also provides the Minuit-style transformation used by the
//! Levenberg-Marquardt solver to enforce bounds on an unconstrained problem.

use serde::{Deserialize, Serialize};
use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when constructing parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds for parameter {index}: min ({min}) must not exceed max ({max})")]
    InvalidBounds { index: usize, min: f64, max: f64 },

    #[error("Lower bounds have {lower} entries but upper bounds have {upper}")]
    LengthMismatch { lower: usize, upper: usize },

    #[error("Parameter {index} value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds {
        index: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Bound for parameter {index} is NaN")]
    NanBound { index: usize },

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,
}

/// The closed interval `[min, max]` allowed for a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Minimum allowed value for the parameter
    pub min: f64,

    /// Maximum allowed value for the parameter
    pub max: f64,
}

impl Serialize for Interval {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("Interval", 2)?;

        // JSON has no infinity, unbounded sides are written as null
        if self.min.is_infinite() && self.min.is_sign_negative() {
            state.serialize_field("min", &Option::<f64>::None)?;
        } else {
            state.serialize_field("min", &Some(self.min))?;
        }

        if self.max.is_infinite() && self.max.is_sign_positive() {
            state.serialize_field("max", &Option::<f64>::None)?;
        } else {
            state.serialize_field("max", &Some(self.max))?;
        }

        state.end()
    }
}

impl<'de> Deserialize<'de> for Interval {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct IntervalHelper {
            #[serde(default)]
            min: Option<f64>,

            #[serde(default)]
            max: Option<f64>,
        }

        let helper = IntervalHelper::deserialize(deserializer)?;

        Ok(Interval {
            min: helper.min.unwrap_or(NEG_INFINITY),
            max: helper.max.unwrap_or(INFINITY),
        })
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }
}

impl Interval {
    /// Create a new interval.
    ///
    /// # Examples
    ///
    /// ```
    /// use mmfit_rs::bounds::Interval;
    ///
    /// let interval = Interval::new(0.0, 10.0).unwrap();
    /// assert_eq!(interval.min, 0.0);
    /// assert!(Interval::new(1.0, 0.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        check_pair(0, min, max)?;
        Ok(Self { min, max })
    }

    /// Create an unbounded interval (negative infinity to positive infinity)
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Check if a value is within the interval
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Check if both ends are finite
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Check if the parameter is bounded from below
    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    /// Check if the parameter is bounded from above
    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// Clamp a value into the interval
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

fn check_pair(index: usize, min: f64, max: f64) -> Result<(), BoundsError> {
    if min.is_nan() || max.is_nan() {
        return Err(BoundsError::NanBound { index });
    }
    if min > max {
        return Err(BoundsError::InvalidBounds { index, min, max });
    }
    Ok(())
}

/// Bounds in the curve-fit convention: all lower bounds, then all upper bounds.
///
/// Serialized as `{"lower": [...], "upper": [...]}` with `null` for an open
/// side; deserializing validates like [`CurveFitBounds::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CurveFitBoundsRepr", into = "CurveFitBoundsRepr")]
pub struct CurveFitBounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl CurveFitBounds {
    /// Create curve-fit bounds from a sequence of lowers and a sequence of uppers.
    ///
    /// ```
    /// use mmfit_rs::bounds::CurveFitBounds;
    ///
    /// let bounds = CurveFitBounds::new(vec![0.0, 0.0], vec![1.0, 10.0]).unwrap();
    /// assert_eq!(bounds.len(), 2);
    /// ```
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, BoundsError> {
        if lower.len() != upper.len() {
            return Err(BoundsError::LengthMismatch {
                lower: lower.len(),
                upper: upper.len(),
            });
        }
        for (index, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
            check_pair(index, lo, hi)?;
        }
        Ok(Self { lower, upper })
    }

    /// Bounds that allow every value for `n` parameters.
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![NEG_INFINITY; n],
            upper: vec![INFINITY; n],
        }
    }

    /// All lower bounds, in parameter order.
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// All upper bounds, in parameter order.
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Per-parameter intervals.
    pub fn intervals(&self) -> Vec<Interval> {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(&min, &max)| Interval { min, max })
            .collect()
    }

    /// Convert to the minimizer convention.
    pub fn to_pairs(&self) -> PairBounds {
        PairBounds(
            self.lower
                .iter()
                .copied()
                .zip(self.upper.iter().copied())
                .collect(),
        )
    }
}

/// Bounds in the minimizer convention: one `(lower, upper)` pair per parameter.
///
/// Serialized as a list of [`Interval`]s; deserializing validates like
/// [`PairBounds::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Interval>", into = "Vec<Interval>")]
pub struct PairBounds(Vec<(f64, f64)>);

impl PairBounds {
    /// Create minimizer bounds, validating every pair.
    ///
    /// ```
    /// use mmfit_rs::bounds::PairBounds;
    ///
    /// let bounds = PairBounds::new(vec![(0.0, 1.0), (0.0, 10.0)]).unwrap();
    /// assert_eq!(bounds.to_curve_fit().lower(), &[0.0, 0.0]);
    /// ```
    pub fn new(pairs: Vec<(f64, f64)>) -> Result<Self, BoundsError> {
        for (index, &(lo, hi)) in pairs.iter().enumerate() {
            check_pair(index, lo, hi)?;
        }
        Ok(Self(pairs))
    }

    /// Bounds that allow every value for `n` parameters.
    pub fn unbounded(n: usize) -> Self {
        Self(vec![(NEG_INFINITY, INFINITY); n])
    }

    pub fn pairs(&self) -> &[(f64, f64)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every pair has finite ends.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|(lo, hi)| lo.is_finite() && hi.is_finite())
    }

    /// Convert to the curve-fit convention.
    pub fn to_curve_fit(&self) -> CurveFitBounds {
        let (lower, upper) = self.0.iter().copied().unzip();
        CurveFitBounds { lower, upper }
    }

    /// Describe why `x` cannot start a bounded search, if it cannot.
    ///
    /// Pairs built through `From` are not validated, so an inverted pair is
    /// reported here rather than at construction.
    pub fn infeasibility(&self, x: &[f64]) -> Option<BoundsError> {
        for (index, &(lo, hi)) in self.0.iter().enumerate() {
            if let Err(err) = check_pair(index, lo, hi) {
                return Some(err);
            }
        }
        for (index, (&value, &(min, max))) in x.iter().zip(self.0.iter()).enumerate() {
            if !(value >= min && value <= max) {
                return Some(BoundsError::ValueOutsideBounds {
                    index,
                    value,
                    min,
                    max,
                });
            }
        }
        None
    }

    /// Clip every coordinate of `x` into its interval.
    ///
    /// Accepts anything yielding `&mut f64`: slices, vectors or
    /// `Array1::iter_mut()`.
    pub fn clip<'a, I>(&self, x: I)
    where
        I: IntoIterator<Item = &'a mut f64>,
    {
        for (value, &(lo, hi)) in x.into_iter().zip(self.0.iter()) {
            *value = value.max(lo).min(hi);
        }
    }
}

impl From<Vec<(f64, f64)>> for PairBounds {
    fn from(pairs: Vec<(f64, f64)>) -> Self {
        Self(pairs)
    }
}

fn open_lower(value: f64) -> Option<f64> {
    (value != NEG_INFINITY).then_some(value)
}

fn open_upper(value: f64) -> Option<f64> {
    (value != INFINITY).then_some(value)
}

/// Wire form of [`CurveFitBounds`]; JSON has no infinity.
#[derive(Serialize, Deserialize)]
struct CurveFitBoundsRepr {
    lower: Vec<Option<f64>>,
    upper: Vec<Option<f64>>,
}

impl From<CurveFitBounds> for CurveFitBoundsRepr {
    fn from(bounds: CurveFitBounds) -> Self {
        Self {
            lower: bounds.lower.into_iter().map(open_lower).collect(),
            upper: bounds.upper.into_iter().map(open_upper).collect(),
        }
    }
}

impl TryFrom<CurveFitBoundsRepr> for CurveFitBounds {
    type Error = BoundsError;

    fn try_from(repr: CurveFitBoundsRepr) -> Result<Self, Self::Error> {
        Self::new(
            repr.lower.into_iter().map(|v| v.unwrap_or(NEG_INFINITY)).collect(),
            repr.upper.into_iter().map(|v| v.unwrap_or(INFINITY)).collect(),
        )
    }
}

impl From<PairBounds> for Vec<Interval> {
    fn from(bounds: PairBounds) -> Self {
        bounds
            .0
            .into_iter()
            .map(|(min, max)| Interval { min, max })
            .collect()
    }
}

impl TryFrom<Vec<Interval>> for PairBounds {
    type Error = BoundsError;

    fn try_from(intervals: Vec<Interval>) -> Result<Self, Self::Error> {
        Self::new(intervals.into_iter().map(|i| (i.min, i.max)).collect())
    }
}

impl From<&CurveFitBounds> for PairBounds {
    fn from(bounds: &CurveFitBounds) -> Self {
        bounds.to_pairs()
    }
}

impl From<&PairBounds> for CurveFitBounds {
    fn from(bounds: &PairBounds) -> Self {
        bounds.to_curve_fit()
    }
}

/// Implements the Minuit-style parameter transformations for handling bounds constraints
///
/// This allows the optimizer to work with unbounded parameters internally, while the
/// external values are constrained to be within the specified bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsTransform {
    interval: Interval,
}

impl BoundsTransform {
    pub fn new(interval: Interval) -> Self {
        Self { interval }
    }

    /// Transform an internal parameter value to an external value
    pub fn to_external(&self, internal_value: f64) -> f64 {
        let b = &self.interval;
        match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => internal_value,
            (true, false) => b.min - 1.0 + (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => b.max + 1.0 - (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => b.min + (internal_value.sin() + 1.0) * (b.max - b.min) / 2.0,
        }
    }

    /// Derivative of [`to_external`](Self::to_external) at `internal_value`
    pub fn derivative(&self, internal_value: f64) -> f64 {
        let b = &self.interval;
        let hyp = (internal_value * internal_value + 1.0).sqrt();
        match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => 1.0,
            (true, false) => internal_value / hyp,
            (false, true) => -internal_value / hyp,
            (true, true) => internal_value.cos() * (b.max - b.min) / 2.0,
        }
    }

    /// Transform an external parameter value to an internal value
    pub fn to_internal(&self, external_value: f64) -> Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        let b = &self.interval;
        if !b.contains(external_value) {
            return Err(BoundsError::ValueOutsideBounds {
                index: 0,
                value: external_value,
                min: b.min,
                max: b.max,
            });
        }

        Ok(match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => external_value,
            (true, false) => ((external_value - b.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((b.max - external_value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let range = b.max - b.min;
                if range == 0.0 {
                    0.0
                } else {
                    // Ensure scaled is in [-1, 1] for asin
                    (2.0 * (external_value - b.min) / range - 1.0)
                        .clamp(-1.0, 1.0)
                        .asin()
                }
            }
        })
    }
}
