//! Direction cosines.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};
use super::{Vector, GEOMETRY_TOLERANCE};
use crate::error::{CoreError, Result};

/// Orientation of the image axes. Column `i` is the unit vector of index
/// axis `i` in physical space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction<const D: usize>(pub SMatrix<f64, D, D>);

impl<const D: usize> Direction<D> {
    pub fn identity() -> Self {
        Self(SMatrix::identity())
    }

    /// Build from axis unit vectors.
    pub fn from_axes(axes: [Vector<D>; D]) -> Self {
        let mut m = SMatrix::<f64, D, D>::zeros();
        for (c, axis) in axes.iter().enumerate() {
            for r in 0..D {
                m[(r, c)] = axis[r];
            }
        }
        Self(m)
    }

    /// Unit vector of index axis `axis`.
    pub fn axis(&self, axis: usize) -> Vector<D> {
        Vector(self.0.column(axis).into_owned())
    }

    pub fn is_orthonormal(&self) -> bool {
        let product = self.0.transpose() * self.0;
        (0..D).all(|i| {
            (0..D).all(|j| {
                let expected = if i == j { 1.0 } else { 0.0 };
                (product[(i, j)] - expected).abs() < GEOMETRY_TOLERANCE
            })
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_orthonormal() {
            Ok(())
        } else {
            Err(CoreError::NonOrthonormalDirection(format!("{:?}", self.0)))
        }
    }

    /// Inverse of an orthonormal direction matrix.
    pub fn transpose(&self) -> Self {
        Self(self.0.transpose())
    }

    pub fn approx_eq(&self, other: &Self) -> bool {
        (0..D).all(|i| {
            (0..D).all(|j| (self.0[(i, j)] - other.0[(i, j)]).abs() <= GEOMETRY_TOLERANCE)
        })
    }

    pub fn inner(&self) -> &SMatrix<f64, D, D> {
        &self.0
    }
}

impl<const D: usize> std::ops::Index<(usize, usize)> for Direction<D> {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}

impl<const D: usize> std::ops::IndexMut<(usize, usize)> for Direction<D> {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<const D: usize> std::ops::Mul<Vector<D>> for Direction<D> {
    type Output = Vector<D>;

    fn mul(self, vector: Vector<D>) -> Self::Output {
        Vector(self.0 * vector.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Direction3 = Direction<3>;
    type Vector3 = Vector<3>;

    #[test]
    fn test_from_axes_is_column_major() {
        let d = Direction3::from_axes([
            Vector3::new([0.0, 1.0, 0.0]),
            Vector3::new([-1.0, 0.0, 0.0]),
            Vector3::new([0.0, 0.0, 1.0]),
        ]);
        assert_eq!(d[(1, 0)], 1.0);
        assert_eq!(d[(0, 1)], -1.0);
        assert_eq!(d.axis(0), Vector3::new([0.0, 1.0, 0.0]));
        assert!(d.is_orthonormal());
    }

    #[test]
    fn test_shear_is_rejected() {
        let mut d = Direction3::identity();
        d[(0, 1)] = 0.3;
        assert!(!d.is_orthonormal());
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_transpose_inverts_rotation() {
        let d = Direction3::from_axes([
            Vector3::new([0.0, 0.0, 1.0]),
            Vector3::new([1.0, 0.0, 0.0]),
            Vector3::new([0.0, 1.0, 0.0]),
        ]);
        let v = Vector3::new([1.0, 2.0, 3.0]);
        let back = d.transpose() * (d * v);
        assert!((back - v).norm() < 1e-12);
    }
}
