//! Voxel spacing.

use super::{Vector, GEOMETRY_TOLERANCE};
use crate::error::{CoreError, Result};

/// Physical distance between neighbouring voxels along each axis.
pub type Spacing<const D: usize> = Vector<D>;

impl<const D: usize> Spacing<D> {
    pub fn uniform(value: f64) -> Self {
        Vector::new([value; D])
    }

    /// Volume of a single voxel (mm^D).
    pub fn voxel_volume(&self) -> f64 {
        (0..D).map(|i| self[i]).product()
    }

    /// Fails unless every component is strictly positive and finite.
    pub fn validate(&self) -> Result<()> {
        for i in 0..D {
            if !(self[i].is_finite() && self[i] > 0.0) {
                return Err(CoreError::InvalidSpacing(format!(
                    "component {} is {}",
                    i, self[i]
                )));
            }
        }
        Ok(())
    }

    /// Component-wise comparison within the geometry tolerance.
    pub fn approx_eq(&self, other: &Self) -> bool {
        (0..D).all(|i| (self[i] - other[i]).abs() <= GEOMETRY_TOLERANCE)
    }
}
