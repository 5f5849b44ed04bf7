//! End-to-end fitting sessions.

mod constrained;
mod non_finite;
mod session;
