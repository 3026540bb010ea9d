//! Configuration error types.

use thiserror::Error;

/// Error loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying loader failure.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A section failed validation.
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// A configuration value failed validation.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("field '{field}' is out of range")]
    OutOfRange { field: String },

    #[error("field '{field}' must not be zero")]
    Zero { field: String },

    #[error("field '{field}' is invalid: {reason}")]
    Invalid { field: String, reason: String },
}
