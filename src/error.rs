use thiserror::Error;

/// Error types for the stellopt-rs library.
#[derive(Error, Debug)]
pub enum StelloptError {
    /// Malformed construction of a node or combinator (mismatched lengths,
    /// invalid bounds, non-finite coefficients).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A DOF vector of the wrong length was supplied.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A DOF assignment fell outside its declared bounds.
    #[error("Value out of bounds: {0}")]
    OutOfBounds(String),

    /// A derivative does not match the shape of the graph it is projected on.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Adding the requested edge would create a dependency cycle.
    #[error("Cyclic dependency: {0}")]
    CyclicDependency(String),

    /// A node id that does not belong to the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(usize),

    /// A DOF name or index that does not exist in its container.
    #[error("DOF not found: {0}")]
    DofNotFound(String),

    /// A kernel or functional failed to evaluate.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<crate::dofs::BoundsError> for StelloptError {
    fn from(err: crate::dofs::BoundsError) -> Self {
        match err {
            crate::dofs::BoundsError::InvalidBounds { .. } => {
                StelloptError::ConfigError(format!("{}", err))
            }
            _ => StelloptError::OutOfBounds(format!("{}", err)),
        }
    }
}

/// Result type alias for stellopt-rs operations.
pub type Result<T> = std::result::Result<T, StelloptError>;
