//! Parameter uncertainty estimates for least-squares fits.

pub mod covariance;

pub use covariance::{calculate_correlation, calculate_covariance, standard_errors_from_covariance};
