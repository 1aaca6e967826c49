//! Error types for the subject pipeline.

use lesionkit_core::CoreError;
use lesionkit_registration::RegistrationError;
use thiserror::Error;

/// Everything that can stop a subject. All variants are fatal for the
/// subject they were raised for.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Operation called in the wrong lifecycle state.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Volumes that must share a grid do not.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// The cohort's files are not in the expected format.
    #[error("Unexpected cohort data: {0}")]
    CohortData(String),

    /// A label without any lesion voxel on a subject that must have one.
    #[error("Subject {0} label is empty")]
    EmptyLabel(String),

    /// Numerically undefined result.
    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Failure of an isolated worker process.
    #[error("Worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Core(CoreError),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    pub fn cohort_data(msg: impl Into<String>) -> Self {
        Self::CohortData(msg.into())
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ZeroVariance(_) => Self::Numerical(err.to_string()),
            CoreError::GridOverflow { .. }
            | CoreError::ShapeMismatch { .. }
            | CoreError::EmptyMask(_) => Self::Consistency(err.to_string()),
            other => Self::Core(other),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.into())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        Self::Io(err.into())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(err.into())
    }
}
