//! Error types for the Ratewarden service.

use thiserror::Error;

/// Main error type for Ratewarden operations.
#[derive(Error, Debug)]
pub enum RatewardenError {
    /// A limit or window that is not strictly positive
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected fault while evaluating a rate limit check
    #[error("Rate limit evaluation failed: {0}")]
    Evaluation(String),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratewarden operations.
pub type Result<T> = std::result::Result<T, RatewardenError>;
