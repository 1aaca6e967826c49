//! Error types for registration operations.

use std::path::PathBuf;

use lesionkit_core::CoreError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// A transform the layout promises is not on disk.
    #[error("Missing transform: {}", .0.display())]
    MissingTransform(PathBuf),

    /// A transform or image file could not be read or written.
    #[error("Transform I/O error: {0}")]
    TransformIo(String),

    /// The external registration tool failed.
    #[error("Registration engine error: {0}")]
    Engine(String),

    /// Error in metric computation.
    #[error("Metric error: {0}")]
    MetricError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a transform I/O error.
    pub fn transform_io(msg: impl Into<String>) -> Self {
        Self::TransformIo(msg.into())
    }

    /// Create an engine error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a metric error.
    pub fn metric(msg: impl Into<String>) -> Self {
        Self::MetricError(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
