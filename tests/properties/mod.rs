//! Properties of the objectives, adapters and bounds conventions.

mod bounds_conversion;
mod curve_fit_recovery;
mod global_search;
mod local_bounds;
mod objective;
