use thiserror::Error;

/// Error types for the mmfit-rs library.
///
/// Optimizer non-convergence and infeasible bounds are not errors: they are
/// reported through [`Status`](crate::result::Status) on the returned result,
/// so that global searches can recover from a single failed local search.
#[derive(Error, Debug)]
pub enum FitError {
    /// The model produced a NaN or infinite value.
    #[error("Model evaluation error: {0}")]
    ModelEvaluation(String),

    /// Parameter vector, bounds, initial guess or dataset lengths disagree.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Malformed bounds passed to a constructor.
    #[error("Bounds error: {0}")]
    InvalidBounds(#[from] crate::bounds::BoundsError),

    /// Optimizer configuration rejected before any work was done.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for mmfit-rs operations.
pub type Result<T> = std::result::Result<T, FitError>;
