//! Metric trait for image similarity measurement.

use burn::tensor::backend::Backend;
use lesionkit_core::image::{index_grid, Image};
use lesionkit_core::interpolation::{inside_buffer, Interpolator, LinearInterpolator};
use lesionkit_core::transform::Transform;
use lesionkit_core::CoreError;

use crate::error::{RegistrationError, Result};

/// Similarity between a fixed image and a moving image seen through a
/// transform.
///
/// # Type Parameters
/// * `B` - The tensor backend
pub trait Metric<B: Backend> {
    /// Similarity of `fixed` and `moving` sampled at `transform(fixed points)`.
    fn evaluate(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Result<f64>;

    /// Get the name of this metric.
    fn name(&self) -> &'static str;
}

/// Paired intensities at fixed voxels whose mapped point falls inside the
/// moving image.
#[derive(Debug, Clone, Default)]
pub struct OverlapSamples {
    pub fixed: Vec<f32>,
    pub moving: Vec<f32>,
}

impl OverlapSamples {
    pub fn len(&self) -> usize {
        self.fixed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty()
    }
}

fn host(tensor: burn::tensor::Tensor<impl Backend, 1>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| RegistrationError::Core(CoreError::data(format!("{e:?}"))))
}

/// Sample `moving` on the voxel grid of `fixed` and keep the overlap.
pub fn sample_overlap<B: Backend>(
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
    transform: &impl Transform<B, 3>,
) -> Result<OverlapSamples> {
    let device = fixed.data().device();
    let [nz, ny, nx] = fixed.shape();
    let n = nz * ny * nx;

    let fixed_indices = index_grid::<B>(fixed.size(), &device);
    let fixed_points = fixed.index_to_world_tensor(fixed_indices);
    let moving_points = transform.transform_points(fixed_points);
    let moving_indices = moving.world_to_index_tensor(moving_points);
    let inside = inside_buffer(moving_indices.clone(), moving.size());
    let moving_values = LinearInterpolator::new().interpolate(moving.data(), moving_indices);
    let fixed_values = fixed.data().clone().reshape([n]);

    let inside = host(inside)?;
    let fixed_values = host(fixed_values)?;
    let moving_values = host(moving_values)?;

    let mut samples = OverlapSamples::default();
    for ((f, m), keep) in fixed_values.into_iter().zip(moving_values).zip(inside) {
        if keep > 0.5 {
            samples.fixed.push(f);
            samples.moving.push(m);
        }
    }
    if samples.is_empty() {
        return Err(RegistrationError::metric("images do not overlap"));
    }
    Ok(samples)
}
