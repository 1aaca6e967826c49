//! Label transport.
//!
//! Categorical masks are moved between grids by casting to float, sampling
//! with *linear* interpolation and rounding every voxel to the nearest class
//! id. Nearest-neighbour sampling is not used: on binary lesion masks the
//! round-after-linear rule behaves like a 0.5 iso-surface and keeps edges
//! smooth under sub-voxel shifts.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::resample::ResampleImageFilter;
use crate::error::Result;
use crate::image::{Frame, LabelImage};
use crate::interpolation::LinearInterpolator;
use crate::transform::{IdentityTransform, Transform};

/// Carry `label` through `transform` onto `reference`.
///
/// `transform` maps reference physical points to label physical points.
pub fn transport_label<B, T>(label: &LabelImage<B>, transform: T, reference: &Frame) -> LabelImage<B>
where
    B: Backend,
    T: Transform<B, 3>,
{
    let filter = ResampleImageFilter::new(*reference, transform, LinearInterpolator::new());
    filter.apply(&label.to_float()).round_to_label()
}

/// Move `label` onto `target` without changing its physical placement.
pub fn resample_label_to_target<B: Backend>(label: &LabelImage<B>, target: &Frame) -> LabelImage<B> {
    transport_label(label, IdentityTransform, target)
}

/// Carry a multi-class parcellation through `transform` onto `reference`.
///
/// Each class is transported as its own binary mask so that no voxel ends
/// up with an id that is the rounded mean of two neighbouring classes.
/// Where two masks claim the same voxel the lower class id wins.
pub fn transport_parcellation<B, T>(
    label: &LabelImage<B>,
    transform: T,
    reference: &Frame,
) -> Result<LabelImage<B>>
where
    B: Backend,
    T: Transform<B, 3>,
{
    let mut classes: Vec<i64> = label.values()?.into_iter().filter(|&v| v != 0).collect();
    classes.sort_unstable();
    classes.dedup();

    let device = label.data().device();
    let mut output = Tensor::<B, 3, Int>::zeros(reference.tensor_shape(), &device);
    for class in classes {
        let mask = label.with_data(label.data().clone().equal_elem(class).int());
        let moved = transport_label(&mask, &transform, reference);
        let free = output.clone().equal_elem(0).int();
        output = output + moved.into_data().mul(free).mul_scalar(class);
    }
    LabelImage::from_frame(output, reference)
}
