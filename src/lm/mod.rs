//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the damped least-squares solver behind
//! [`curve_fit`](crate::curve_fit::curve_fit).

pub mod algorithm;
pub mod config;
pub mod trust_region;

// Re-export key types
pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
pub use trust_region::TrustRegion;
