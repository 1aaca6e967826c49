//! Interpolator trait for sampling values at continuous coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Samples a `[z, y, x]` volume at continuous `(x, y, z)` indices.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Interpolator<B: Backend> {
    /// # Arguments
    /// * `data` - Volume `[D, H, W]`
    /// * `indices` - Continuous indices `[Batch, 3]` in `(x, y, z)` order
    ///
    /// # Returns
    /// Sampled values `[Batch]`
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1>;
}

/// 1.0 where a continuous index lies inside the voxel buffer, 0.0 elsewhere.
///
/// A sample belongs to the buffer when every component is in
/// `[-0.5, n - 0.5)`, the half-voxel convention ITK uses to decide whether
/// a resampled point takes the default value.
pub fn inside_buffer<B: Backend>(indices: Tensor<B, 2>, size: [usize; 3]) -> Tensor<B, 1> {
    let mut inside: Option<Tensor<B, 1>> = None;
    for (axis, &n) in size.iter().enumerate() {
        let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
        let lower = coord.clone().greater_equal_elem(-0.5).float();
        let upper = coord.lower_elem(n as f64 - 0.5).float();
        let both = lower * upper;
        inside = Some(match inside {
            Some(acc) => acc * both,
            None => both,
        });
    }
    // size has three entries, so the loop always runs.
    inside.unwrap_or_else(|| Tensor::ones([indices.dims()[0]], &indices.device()))
}
