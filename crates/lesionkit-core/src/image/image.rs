//! Image type with physical metadata.
//!
//! An [`Image`] pairs a `burn` tensor with the origin, spacing and
//! direction that place its voxels in LPS world space. Intensity volumes
//! use the default `Float` kind, categorical volumes use `Int`
//! ([`LabelImage`]).

use burn::tensor::backend::Backend;
use burn::tensor::{BasicOps, Float, Int, Tensor, TensorData, TensorKind};

use super::frame::{CoordinateConvention, Frame};
use crate::error::{CoreError, Result};
use crate::spatial::{Direction, Point, Spacing};

/// Medical image with physical metadata.
///
/// # Coordinate Systems
/// * **Index space**: `(x, y, z)` voxel indices; tensor layout is `[z, y, x]`.
/// * **Physical space**: millimetres, LPS convention.
///
/// # Examples
/// ```rust
/// use lesionkit_core::Image;
/// use lesionkit_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 5, 6], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::uniform(1.0), Direction3::identity());
/// assert_eq!(image.size(), [6, 5, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize, K: TensorKind<B> = Float> {
    data: Tensor<B, D, K>,
    origin: Point<D>,
    spacing: Spacing<D>,
    direction: Direction<D>,
}

/// Categorical volume (class ids).
pub type LabelImage<B> = Image<B, 3, Int>;

impl<B: Backend, const D: usize, K: TensorKind<B>> Image<B, D, K> {
    pub fn new(
        data: Tensor<B, D, K>,
        origin: Point<D>,
        spacing: Spacing<D>,
        direction: Direction<D>,
    ) -> Self {
        Self {
            data,
            origin,
            spacing,
            direction,
        }
    }

    pub fn data(&self) -> &Tensor<B, D, K> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, D, K> {
        self.data
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// New image on the same grid holding `data`.
    pub fn with_data<K2: TensorKind<B>>(&self, data: Tensor<B, D, K2>) -> Image<B, D, K2> {
        Image::new(data, self.origin, self.spacing, self.direction)
    }
}

impl<B: Backend, const D: usize, K: BasicOps<B>> Image<B, D, K> {
    /// Tensor shape, slowest axis first (`[z, y, x]` in 3D).
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }
}

impl<B: Backend, K: BasicOps<B>> Image<B, 3, K> {
    /// Create an image on a frame given in any convention.
    pub fn from_frame(data: Tensor<B, 3, K>, frame: &Frame) -> Result<Self> {
        let expected = frame.tensor_shape();
        let actual = data.dims();
        if expected != actual {
            return Err(CoreError::shape_mismatch(&expected, &actual));
        }
        let lps = frame.to_convention(CoordinateConvention::Lps);
        Ok(Self::new(data, lps.origin, lps.spacing, lps.direction))
    }

    /// Grid size in physical axis order `[nx, ny, nz]`.
    pub fn size(&self) -> [usize; 3] {
        let [z, y, x] = self.data.dims();
        [x, y, z]
    }

    /// The voxel grid of this image, in LPS.
    pub fn frame(&self) -> Frame {
        Frame {
            size: self.size(),
            origin: self.origin,
            spacing: self.spacing,
            direction: self.direction,
            convention: CoordinateConvention::Lps,
        }
    }

    /// Map a physical point to a continuous `(x, y, z)` index.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<3>) -> [f64; 3] {
        self.frame().physical_to_index(point)
    }

    /// Map a continuous `(x, y, z)` index to a physical point.
    pub fn transform_continuous_index_to_physical_point(&self, index: [f64; 3]) -> Point<3> {
        self.frame().index_to_physical(index)
    }

    /// Batch version of [`Self::transform_physical_point_to_continuous_index`].
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.frame().world_to_index_tensor(points)
    }

    /// Batch version of [`Self::transform_continuous_index_to_physical_point`].
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        self.frame().index_to_world_tensor(indices)
    }
}

impl<B: Backend> Image<B, 3> {
    /// Build a float image from voxels in `[z, y, x]` order.
    pub fn from_values(values: Vec<f32>, frame: &Frame, device: &B::Device) -> Result<Self> {
        let shape = frame.tensor_shape();
        if values.len() != frame.num_voxels() {
            return Err(CoreError::shape_mismatch(&shape, &[values.len()]));
        }
        let data = TensorData::new(values, shape).convert::<B::FloatElem>();
        Self::from_frame(Tensor::<B, 3>::from_data(data, device), frame)
    }
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Voxel values in tensor order.
    pub fn values(&self) -> Result<Vec<f32>> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::data(format!("{e:?}")))
    }

    /// Round every voxel to the nearest integer class id.
    pub fn round_to_label(&self) -> Image<B, D, Int> {
        self.with_data(self.data.clone().round().int())
    }
}

impl<B: Backend> Image<B, 3, Int> {
    /// Build a label image from class ids in `[z, y, x]` order.
    pub fn from_labels(values: Vec<i64>, frame: &Frame, device: &B::Device) -> Result<Self> {
        let shape = frame.tensor_shape();
        if values.len() != frame.num_voxels() {
            return Err(CoreError::shape_mismatch(&shape, &[values.len()]));
        }
        let data = TensorData::new(values, shape).convert::<B::IntElem>();
        Self::from_frame(Tensor::<B, 3, Int>::from_data(data, device), frame)
    }
}

impl<B: Backend, const D: usize> Image<B, D, Int> {
    /// Class ids in tensor order.
    pub fn values(&self) -> Result<Vec<i64>> {
        self.data
            .clone()
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| CoreError::data(format!("{e:?}")))
    }

    /// Cast class ids to floats for interpolation or masking.
    pub fn to_float(&self) -> Image<B, D> {
        self.with_data(self.data.clone().float())
    }

    /// Binary mask of non-zero voxels.
    pub fn nonzero(&self) -> Image<B, D, Int> {
        self.with_data(self.data.clone().not_equal_elem(0).int())
    }

    pub fn count_nonzero(&self) -> usize {
        use burn::tensor::ElementConversion;
        let count: i64 = self
            .data
            .clone()
            .not_equal_elem(0)
            .int()
            .sum()
            .into_scalar()
            .elem();
        count.max(0) as usize
    }
}
