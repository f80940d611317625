//! Central error handling for envprobe
//!
//! Provides a unified RenderError enum covering resource construction,
//! shader compilation, and precondition failures. Every failure in the
//! precompute core is fatal to the operation that raised it; there is no
//! local recovery or retry anywhere below this type.

/// Centralized error type for all resource and pipeline operations
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Shader '{path}' failed: {detail}")]
    Shader { path: String, detail: String },

    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Convenience constructors for common error types
    pub fn resource<T: ToString>(msg: T) -> Self {
        RenderError::Resource(msg.to_string())
    }

    pub fn shader<P: ToString, D: ToString>(path: P, detail: D) -> Self {
        RenderError::Shader {
            path: path.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn precondition<T: ToString>(msg: T) -> Self {
        RenderError::Precondition(msg.to_string())
    }

    pub fn decode<T: ToString>(msg: T) -> Self {
        RenderError::Decode(msg.to_string())
    }
}

/// Result type alias for all envprobe operations
pub type RenderResult<T> = Result<T, RenderError>;
