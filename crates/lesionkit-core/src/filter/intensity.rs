//! Masking and intensity normalisation.

use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::image::{Image, LabelImage};

/// Summary statistics of the voxels of an image, accumulated in `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelStatistics {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

pub fn voxel_statistics<B: Backend>(image: &Image<B, 3>) -> Result<VoxelStatistics> {
    let values = image.values()?;
    if values.is_empty() {
        return Err(CoreError::data("statistics of an empty image"));
    }
    let count = values.len();
    let mut sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in &values {
        let v = v as f64;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }
    let mean = sum / count as f64;
    let var = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / count as f64;

    Ok(VoxelStatistics {
        count,
        mean,
        std: var.sqrt(),
        min,
        max,
    })
}

fn check_same_size<B: Backend, K1, K2>(a: &Image<B, 3, K1>, b: &Image<B, 3, K2>) -> Result<()>
where
    K1: burn::tensor::BasicOps<B>,
    K2: burn::tensor::BasicOps<B>,
{
    if a.shape() != b.shape() {
        return Err(CoreError::shape_mismatch(&a.shape(), &b.shape()));
    }
    Ok(())
}

/// Zero every voxel of `image` outside `mask`.
///
/// Non-zero mask values count as inside, whatever the class id.
pub fn mask_image<B: Backend>(image: &Image<B, 3>, mask: &LabelImage<B>) -> Result<Image<B, 3>> {
    check_same_size(image, mask)?;
    let weights = mask.nonzero().to_float();
    Ok(image.with_data(image.data().clone() * weights.into_data()))
}

/// Zero every class id of `label` outside `mask`.
pub fn mask_label<B: Backend>(label: &LabelImage<B>, mask: &LabelImage<B>) -> Result<LabelImage<B>> {
    check_same_size(label, mask)?;
    let weights = mask.nonzero().into_data();
    Ok(label.with_data(label.data().clone() * weights))
}

/// `(x - mean) / std` over all voxels.
///
/// Fails with [`CoreError::ZeroVariance`] on a constant image rather than
/// producing NaN.
pub fn z_score<B: Backend>(image: &Image<B, 3>) -> Result<Image<B, 3>> {
    let stats = voxel_statistics(image)?;
    if !(stats.std > f64::EPSILON) {
        return Err(CoreError::ZeroVariance(format!(
            "constant intensity {} over {} voxels",
            stats.mean, stats.count
        )));
    }
    let data = image
        .data()
        .clone()
        .sub_scalar(stats.mean)
        .div_scalar(stats.std);
    Ok(image.with_data(data))
}
