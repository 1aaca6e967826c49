use burn::tensor::backend::Backend;

use crate::image::LabelImage;
use crate::spatial::Spacing;

/// `count · ∏ spacing / 1000`, spacing in millimetres.
pub fn voxel_count_to_volume_ml(count: usize, spacing: &Spacing<3>) -> f64 {
    count as f64 * spacing.voxel_volume() / 1000.0
}

/// Volume of the non-zero voxels of `label` in millilitres.
pub fn label_volume_ml<B: Backend>(label: &LabelImage<B>) -> f64 {
    voxel_count_to_volume_ml(label.count_nonzero(), label.spacing())
}
