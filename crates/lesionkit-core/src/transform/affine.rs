//! Affine transform implementation.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use super::trait_::Transform;
use crate::spatial::Point;

/// Affine Transform (Linear transformation + Translation).
///
/// Represents a general affine transformation with a fixed center:
/// T(x) = A(x - c) + c + t
///
/// where:
/// * A is a 3×3 matrix (rotation, scale, shear)
/// * t is the translation
/// * c is the fixed center of rotation/scaling
///
/// This is the parameterisation ITK and ANTs persist, so a transform read
/// from disk keeps its numbers exactly. Parameters live on the host in
/// `f64`; only application touches the tensor backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    matrix: Matrix3<f64>,
    translation: Vector3<f64>,
    center: Point<3>,
}

impl AffineTransform {
    pub fn new(matrix: Matrix3<f64>, translation: Vector3<f64>, center: Point<3>) -> Self {
        Self {
            matrix,
            translation,
            center,
        }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros(), Point::origin())
    }

    /// Pure translation `x + t`.
    pub fn translation_only(translation: Vector3<f64>) -> Self {
        Self::new(Matrix3::identity(), translation, Point::origin())
    }

    /// Rigid rotation about `center` followed by `translation`.
    pub fn rigid(rotation: Matrix3<f64>, translation: Vector3<f64>, center: Point<3>) -> Self {
        Self::new(rotation, translation, center)
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn translation(&self) -> &Vector3<f64> {
        &self.translation
    }

    pub fn center(&self) -> &Point<3> {
        &self.center
    }

    /// Offset `o` such that T(x) = A x + o.
    pub fn offset(&self) -> Vector3<f64> {
        let c = self.center.0.coords;
        self.translation + c - self.matrix * c
    }

    /// Homogeneous 4×4 form.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.matrix);
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.offset());
        m
    }

    /// Apply to a single point on the host.
    pub fn apply_point(&self, point: &Point<3>) -> Point<3> {
        let x = point.0.coords;
        let c = self.center.0.coords;
        let y = self.matrix * (x - c) + c + self.translation;
        Point::new([y[0], y[1], y[2]])
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &AffineTransform) -> AffineTransform {
        let matrix = self.matrix * other.matrix;
        let offset = self.matrix * other.offset() + self.offset();
        // Keep the center of the inner transform; derive the translation.
        let c = other.center.0.coords;
        let translation = offset - c + matrix * c;
        Self::new(matrix, translation, other.center)
    }

    /// Closed-form inverse about the same center, `None` if A is singular.
    pub fn try_inverse(&self) -> Option<AffineTransform> {
        let inv = self.matrix.try_inverse()?;
        Some(Self::new(inv, -(inv * self.translation), self.center))
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl<B: Backend> Transform<B, 3> for AffineTransform {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();

        // Row-vector form for [N, 3] inputs: y = x @ Aᵀ + o
        let mut a_t = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                a_t.push(self.matrix[(c, r)] as f32);
            }
        }
        let a_t = Tensor::<B, 2>::from_data(
            TensorData::new(a_t, [3, 3]).convert::<B::FloatElem>(),
            &device,
        );
        let offset = self.offset();
        let offset = Tensor::<B, 1>::from_data(
            TensorData::new(vec![offset[0] as f32, offset[1] as f32, offset[2] as f32], [3])
                .convert::<B::FloatElem>(),
            &device,
        )
        .reshape([1, 3]);

        points.matmul(a_t) + offset
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B, 3>>> {
        self.try_inverse()
            .map(|inv| Box::new(inv) as Box<dyn Transform<B, 3>>)
    }
}
