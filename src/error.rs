//! Error types for the anofox-dlm library.

use thiserror::Error;

/// Result type alias for DLM operations.
pub type Result<T> = std::result::Result<T, DlmError>;

/// Errors that can occur while building, filtering or forecasting a DLM.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DlmError {
    /// Matrix shapes disagree, or a prior covariance is not symmetric.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A component with the same name is already registered.
    #[error("component '{0}' already exists")]
    NameCollision(String),

    /// No component with this name is registered.
    #[error("component '{0}' not found")]
    NotFound(String),

    /// The model has no static component to anchor it.
    #[error("model requires at least one static component")]
    EmptyModel,

    /// Filtering was requested to resume from a step that was never filtered.
    #[error("step {start} cannot resume: the previous step has not been filtered")]
    UnfilteredPredecessor { start: usize },

    /// Smoothing or prediction was requested from an unfiltered step.
    #[error("step {date} has not been filtered")]
    Unfiltered { date: usize },

    /// A whole result stream is empty.
    #[error("no {stream} results are available")]
    NoResults { stream: String },

    /// Discount factor outside (0, 1].
    #[error("invalid discount {0}: must lie in (0, 1]")]
    InvalidDiscount(f64),

    /// A time-varying component has no evaluation for the requested step.
    #[error("component '{component}' has no features for step {step}")]
    MissingFeature { component: String, step: usize },

    /// An autoregressive lag is longer than the series it is built over.
    #[error("autoregressive degree {degree} exceeds series length {len}")]
    DegreeExceedsData { degree: usize, len: usize },

    /// The model must be initialized before this operation.
    #[error("model must be initialized before filtering")]
    NotInitialized,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Index out of bounds.
    #[error("index out of bounds: {index} (size: {size})")]
    IndexOutOfBounds { index: usize, size: usize },

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),
}
