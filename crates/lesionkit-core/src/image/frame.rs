//! Voxel grid geometry.
//!
//! A [`Frame`] fixes how voxel indices map to physical coordinates:
//!
//! `point = origin + direction * (index ⊙ spacing)`
//!
//! together with the world coordinate convention the numbers are written
//! in. NIfTI headers describe RAS space; ITK/ANTs transforms, displacement
//! fields and NRRD segmentations describe LPS space. Everything inside the
//! pipeline is LPS and [`convert_affine`] is the single place where the two
//! are reconciled.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::spatial::{Direction, Point, Spacing, Vector, GEOMETRY_TOLERANCE};

/// World coordinate convention of a frame or affine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinateConvention {
    /// +x right, +y anterior, +z superior (NIfTI, nibabel).
    Ras,
    /// +x left, +y posterior, +z superior (ITK, ANTs, SimpleITK, Slicer).
    Lps,
}

/// Express a homogeneous voxel-to-world affine in another convention.
///
/// RAS and LPS differ by a sign flip of the first two world axes, so the
/// conversion negates rows 0 and 1 and is its own inverse.
pub fn convert_affine(
    affine: &Matrix4<f64>,
    from: CoordinateConvention,
    to: CoordinateConvention,
) -> Matrix4<f64> {
    if from == to {
        return *affine;
    }
    let flip = Matrix4::from_diagonal(&nalgebra::Vector4::new(-1.0, -1.0, 1.0, 1.0));
    flip * affine
}

/// Split a voxel-to-world affine into origin, spacing and direction cosines.
///
/// Spacing is the norm of each column of the linear block, direction is the
/// column normalised, origin is the translation column.
pub fn decompose_affine(affine: &Matrix4<f64>) -> Result<(Point<3>, Spacing<3>, Direction<3>)> {
    let mut spacing = Spacing::<3>::zeros();
    let mut direction = Direction::<3>::identity();

    for axis in 0..3 {
        let column = Vector3::new(affine[(0, axis)], affine[(1, axis)], affine[(2, axis)]);
        let norm = column.norm();
        if !(norm > 1e-9) {
            return Err(CoreError::SingularAffine { axis, norm });
        }
        spacing[axis] = norm;
        for r in 0..3 {
            direction[(r, axis)] = column[r] / norm;
        }
    }

    let origin = Point::new([affine[(0, 3)], affine[(1, 3)], affine[(2, 3)]]);
    Ok((origin, spacing, direction))
}

/// Geometry of a 3D voxel grid.
///
/// `size` is in physical axis order `[nx, ny, nz]`; the tensor holding the
/// voxels is `[nz, ny, nx]` (see [`Frame::tensor_shape`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub size: [usize; 3],
    pub origin: Point<3>,
    pub spacing: Spacing<3>,
    pub direction: Direction<3>,
    pub convention: CoordinateConvention,
}

impl Frame {
    /// Create a frame, checking spacing and direction invariants.
    pub fn new(
        size: [usize; 3],
        origin: Point<3>,
        spacing: Spacing<3>,
        direction: Direction<3>,
        convention: CoordinateConvention,
    ) -> Result<Self> {
        let frame = Self {
            size,
            origin,
            spacing,
            direction,
            convention,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Frame in LPS space, the working convention of the pipeline.
    pub fn lps(size: [usize; 3], origin: Point<3>, spacing: Spacing<3>, direction: Direction<3>) -> Result<Self> {
        Self::new(size, origin, spacing, direction, CoordinateConvention::Lps)
    }

    /// Build a frame from a voxel-to-world affine.
    pub fn from_affine(
        size: [usize; 3],
        affine: &Matrix4<f64>,
        convention: CoordinateConvention,
    ) -> Result<Self> {
        let (origin, spacing, direction) = decompose_affine(affine)?;
        Self::new(size, origin, spacing, direction, convention)
    }

    pub fn validate(&self) -> Result<()> {
        self.spacing.validate()?;
        self.direction.validate()
    }

    /// Homogeneous voxel-to-world affine.
    pub fn to_affine(&self) -> Matrix4<f64> {
        let mut affine = Matrix4::identity();
        for c in 0..3 {
            for r in 0..3 {
                affine[(r, c)] = self.direction[(r, c)] * self.spacing[c];
            }
            affine[(c, 3)] = self.origin[c];
        }
        affine
    }

    /// The same grid expressed in another world convention.
    pub fn to_convention(&self, convention: CoordinateConvention) -> Self {
        if convention == self.convention {
            return *self;
        }
        let affine = convert_affine(&self.to_affine(), self.convention, convention);
        // Row flips keep column norms, so the spacing is unchanged.
        let mut direction = self.direction;
        let mut origin = self.origin;
        for r in 0..3 {
            for c in 0..3 {
                direction[(r, c)] = affine[(r, c)] / self.spacing[c];
            }
            origin[r] = affine[(r, 3)];
        }
        Self {
            origin,
            direction,
            convention,
            ..*self
        }
    }

    /// Tensor shape `[nz, ny, nx]` of a volume on this grid.
    pub fn tensor_shape(&self) -> [usize; 3] {
        [self.size[2], self.size[1], self.size[0]]
    }

    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Volume of one voxel in millilitres.
    pub fn voxel_volume_ml(&self) -> f64 {
        self.spacing.voxel_volume() / 1000.0
    }

    /// `origin + direction * (index ⊙ spacing)`
    pub fn index_to_physical(&self, index: [f64; 3]) -> Point<3> {
        let scaled = Vector::new(index).component_mul(&self.spacing);
        self.origin + self.direction * scaled
    }

    /// `(directionᵀ * (point - origin)) ⊘ spacing`
    pub fn physical_to_index(&self, point: &Point<3>) -> [f64; 3] {
        let rotated = self.direction.transpose() * (*point - self.origin);
        [
            rotated[0] / self.spacing[0],
            rotated[1] / self.spacing[1],
            rotated[2] / self.spacing[2],
        ]
    }

    /// Physical centre of the grid (continuous index `(n - 1) / 2`).
    pub fn center(&self) -> Point<3> {
        self.index_to_physical([
            (self.size[0] as f64 - 1.0) / 2.0,
            (self.size[1] as f64 - 1.0) / 2.0,
            (self.size[2] as f64 - 1.0) / 2.0,
        ])
    }

    /// Same size, spacing, direction and origin within tolerance.
    pub fn same_grid(&self, other: &Frame) -> bool {
        let other = other.to_convention(self.convention);
        self.size == other.size
            && self.spacing.approx_eq(&other.spacing)
            && self.direction.approx_eq(&other.direction)
            && (self.origin - other.origin).norm() <= GEOMETRY_TOLERANCE.max(1e-4)
    }

    /// Frame of the sub-grid starting at `start` (x, y, z index order).
    pub fn sub_frame(&self, start: [usize; 3], size: [usize; 3]) -> Self {
        let origin = self.index_to_physical([start[0] as f64, start[1] as f64, start[2] as f64]);
        Self {
            size,
            origin,
            ..*self
        }
    }

    /// Batch map physical points `[N, 3]` to continuous indices `[N, 3]`.
    pub fn world_to_index_tensor<B: Backend>(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = points.device();

        // index = (p - o) @ T, T[r, c] = dir[r, c] / spacing[c]
        let mut t = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                t.push((self.direction[(r, c)] / self.spacing[c]) as f32);
            }
        }
        let t = Tensor::<B, 2>::from_data(TensorData::new(t, [3, 3]).convert::<B::FloatElem>(), &device);

        (points - self.origin_row::<B>(&device)).matmul(t)
    }

    /// Batch map continuous indices `[N, 3]` to physical points `[N, 3]`.
    pub fn index_to_world_tensor<B: Backend>(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        let device = indices.device();

        // p = o + i @ M, M[r, c] = spacing[r] * dir[c, r]
        let mut m = Vec::with_capacity(9);
        for r in 0..3 {
            for c in 0..3 {
                m.push((self.spacing[r] * self.direction[(c, r)]) as f32);
            }
        }
        let m = Tensor::<B, 2>::from_data(TensorData::new(m, [3, 3]).convert::<B::FloatElem>(), &device);

        indices.matmul(m) + self.origin_row::<B>(&device)
    }

    fn origin_row<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let origin: Vec<f32> = self.origin.to_array().iter().map(|&v| v as f32).collect();
        Tensor::<B, 1>::from_data(TensorData::new(origin, [3]).convert::<B::FloatElem>(), device)
            .reshape([1, 3])
    }

    /// Linear block `direction * diag(spacing)` as a plain matrix.
    pub fn linear_part(&self) -> Matrix3<f64> {
        self.direction.0 * Matrix3::from_diagonal(&self.spacing.0)
    }
}
