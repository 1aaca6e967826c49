//! Dense displacement field transform.
//!
//! Each voxel of the field's own grid stores a physical displacement
//! vector. A point `p` maps to `p + u(p)`, where `u` is interpolated
//! trilinearly and is zero outside the field's buffer. This is how ANTs
//! applies the `*Warp.nii.gz` half of a SyN result.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::trait_::Transform;
use crate::error::{CoreError, Result};
use crate::image::{index_grid, CoordinateConvention, Frame};
use crate::interpolation::{inside_buffer, Interpolator, LinearInterpolator};

/// How a displacement field is inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InverseStrategy {
    /// `v = -u`. Exact only for constant fields; this is the approximation
    /// long used to carry template-space predictions back to native space.
    Negate,
    /// Solve `v(y) = -u(y + v(y))` by fixed-point iteration on the field grid.
    FixedPoint { iterations: usize },
}

impl Default for InverseStrategy {
    fn default() -> Self {
        Self::Negate
    }
}

/// Dense displacement field on a 3D grid.
///
/// `field` has shape `[3, nz, ny, nx]`; component 0 is the x displacement.
/// Vectors are LPS millimetres.
#[derive(Debug, Clone)]
pub struct DisplacementFieldTransform<B: Backend> {
    field: Tensor<B, 4>,
    frame: Frame,
    interpolator: LinearInterpolator,
}

impl<B: Backend> DisplacementFieldTransform<B> {
    pub fn new(field: Tensor<B, 4>, frame: Frame) -> Result<Self> {
        let [nz, ny, nx] = frame.tensor_shape();
        let dims = field.dims();
        if dims != [3, nz, ny, nx] {
            return Err(CoreError::shape_mismatch(&[3, nz, ny, nx], &dims));
        }
        Ok(Self {
            field,
            frame: frame.to_convention(CoordinateConvention::Lps),
            interpolator: LinearInterpolator::new(),
        })
    }

    /// A field that displaces nothing.
    pub fn zeros(frame: Frame, device: &B::Device) -> Self {
        let [nz, ny, nx] = frame.tensor_shape();
        Self {
            field: Tensor::zeros([3, nz, ny, nx], device),
            frame: frame.to_convention(CoordinateConvention::Lps),
            interpolator: LinearInterpolator::new(),
        }
    }

    pub fn field(&self) -> &Tensor<B, 4> {
        &self.field
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Interpolated displacement `u(p)` for points `[N, 3]`.
    pub fn displacement_at(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let [nz, ny, nx] = self.frame.tensor_shape();
        let indices = self.frame.world_to_index_tensor(points);
        let inside = inside_buffer(indices.clone(), self.frame.size);

        let components = (0..3)
            .map(|c| {
                let volume = self.field.clone().narrow(0, c, 1).reshape([nz, ny, nx]);
                let sampled = self.interpolator.interpolate(&volume, indices.clone());
                (sampled * inside.clone()).unsqueeze_dim::<2>(1)
            })
            .collect::<Vec<_>>();

        Tensor::cat(components, 1)
    }

    /// Field with every vector reversed.
    pub fn negated(&self) -> Self {
        Self {
            field: self.field.clone().neg(),
            frame: self.frame,
            interpolator: self.interpolator,
        }
    }

    /// Fixed-point inverse sampled on the same grid.
    pub fn inverted_fixed_point(&self, iterations: usize) -> Self {
        let [nz, ny, nx] = self.frame.tensor_shape();
        let n = nz * ny * nx;
        let device = self.field.device();

        let grid = index_grid::<B>(self.frame.size, &device);
        let y = self.frame.index_to_world_tensor(grid);
        let mut v = Tensor::<B, 2>::zeros([n, 3], &device);
        for _ in 0..iterations {
            v = self.displacement_at(y.clone() + v).neg();
        }

        let field = v.swap_dims(0, 1).reshape([3, nz, ny, nx]);
        Self {
            field,
            frame: self.frame,
            interpolator: self.interpolator,
        }
    }

    /// Approximate inverse according to `strategy`.
    pub fn invert(&self, strategy: InverseStrategy) -> Self {
        match strategy {
            InverseStrategy::Negate => self.negated(),
            InverseStrategy::FixedPoint { iterations } => self.inverted_fixed_point(iterations),
        }
    }
}

impl<B: Backend> Transform<B, 3> for DisplacementFieldTransform<B> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let displacement = self.displacement_at(points.clone());
        points + displacement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Direction, Point, Spacing};
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn centered_frame() -> Frame {
        Frame::lps(
            [11, 11, 11],
            Point::new([-5.0, -5.0, -5.0]),
            Spacing::uniform(1.0),
            Direction::identity(),
        )
        .unwrap()
    }

    /// u(p) = (k * p_x, 0, 0)
    fn linear_field(k: f32) -> DisplacementFieldTransform<TestBackend> {
        let device = Default::default();
        let frame = centered_frame();
        let mut values = vec![0.0f32; 3 * 11 * 11 * 11];
        for z in 0..11 {
            for y in 0..11 {
                for x in 0..11 {
                    values[(z * 11 + y) * 11 + x] = k * (x as f32 - 5.0);
                }
            }
        }
        let field = Tensor::from_data(TensorData::new(values, [3, 11, 11, 11]), &device);
        DisplacementFieldTransform::new(field, frame).unwrap()
    }

    fn to_vec(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_zero_field_is_identity() {
        let device = Default::default();
        let transform = DisplacementFieldTransform::<TestBackend>::zeros(centered_frame(), &device);
        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, -2.0, 3.5]], &device);
        assert_eq!(to_vec(transform.transform_points(points)), vec![1.0, -2.0, 3.5]);
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let device = Default::default();
        let field = Tensor::<TestBackend, 4>::zeros([3, 4, 4, 4], &device);
        assert!(DisplacementFieldTransform::new(field, centered_frame()).is_err());
    }

    #[test]
    fn test_interpolates_inside_and_vanishes_outside() {
        let device = Default::default();
        let transform = linear_field(0.2);
        let points = Tensor::<TestBackend, 2>::from_floats(
            [[2.5, 0.0, 0.0], [40.0, 0.0, 0.0]],
            &device,
        );
        let out = to_vec(transform.transform_points(points));
        assert!((out[0] - 3.0).abs() < 1e-5);
        assert_eq!(out[3], 40.0);
    }

    #[test]
    fn test_fixed_point_beats_negation() {
        let device = Default::default();
        let forward = linear_field(0.2);
        let point = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0, 0.0]], &device);

        let negated = to_vec(forward.invert(InverseStrategy::Negate).displacement_at(point.clone()));
        let fixed = to_vec(
            forward
                .invert(InverseStrategy::FixedPoint { iterations: 20 })
                .displacement_at(point),
        );

        // Exact inverse displacement at x = 2 is -0.4 / 1.2.
        let exact = -0.4f32 / 1.2;
        assert!((negated[0] + 0.4).abs() < 1e-5);
        assert!((fixed[0] - exact).abs() < 1e-3);
        assert!((fixed[0] - exact).abs() < (negated[0] - exact).abs());
    }

    #[test]
    fn test_default_strategy_is_negate() {
        assert_eq!(InverseStrategy::default(), InverseStrategy::Negate);
    }
}
