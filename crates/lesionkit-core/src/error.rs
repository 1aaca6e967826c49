//! Error types for geometric operations.

use thiserror::Error;

/// Errors raised by frame, transform and filter operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Affine matrix with a (near) zero column.
    #[error("Singular affine: column {axis} has norm {norm:e}")]
    SingularAffine { axis: usize, norm: f64 },

    /// Direction cosines that are not orthonormal.
    #[error("Direction matrix is not orthonormal: {0}")]
    NonOrthonormalDirection(String),

    /// Non-positive spacing component.
    #[error("Invalid spacing: {0}")]
    InvalidSpacing(String),

    /// Transform without an inverse.
    #[error("Transform is not invertible: {0}")]
    NonInvertible(String),

    /// A mask selected no voxel.
    #[error("Mask is empty: {0}")]
    EmptyMask(String),

    /// A volume exceeds the grid it must be padded into.
    #[error("Volume of size {size:?} does not fit target grid {target:?} (axis {axis})")]
    GridOverflow {
        axis: usize,
        size: [usize; 3],
        target: [usize; 3],
    },

    /// Zero intensity variance where normalisation was requested.
    #[error("Zero variance: {0}")]
    ZeroVariance(String),

    /// Shape mismatch between two volumes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Tensor data could not be read back.
    #[error("Tensor data error: {0}")]
    Data(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a tensor data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    /// Create an empty mask error.
    pub fn empty_mask(msg: impl Into<String>) -> Self {
        Self::EmptyMask(msg.into())
    }

    /// Create a shape mismatch error from two tensor shapes.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
