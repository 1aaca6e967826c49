//! Region filters: bounding box, crop, pad, and resampling to a spacing.
//!
//! Crop and pad never resample; they move the origin along the direction
//! cosines so that every kept voxel stays at the same physical position.

use std::ops::Range;

use burn::tensor::backend::Backend;
use burn::tensor::{BasicOps, Int, Tensor};
use tracing::debug;

use super::resample::ResampleImageFilter;
use crate::error::{CoreError, Result};
use crate::image::{Frame, Image, LabelImage};
use crate::interpolation::LinearInterpolator;
use crate::spatial::Spacing;
use crate::transform::IdentityTransform;

/// Axis-aligned voxel box in `(x, y, z)` index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub start: [usize; 3],
    pub size: [usize; 3],
}

impl BoundingBox {
    pub fn end(&self) -> [usize; 3] {
        [
            self.start[0] + self.size[0],
            self.start[1] + self.size[1],
            self.start[2] + self.size[2],
        ]
    }

    /// Tensor ranges in `[z, y, x]` order.
    fn tensor_ranges(&self) -> [Range<usize>; 3] {
        let end = self.end();
        [
            self.start[2]..end[2],
            self.start[1]..end[1],
            self.start[0]..end[0],
        ]
    }
}

/// Smallest box holding every non-zero voxel of `mask`.
pub fn bounding_box<B: Backend>(mask: &LabelImage<B>) -> Result<BoundingBox> {
    let [nx, ny, _] = mask.size();
    let values = mask.values()?;

    let mut lo = [usize::MAX; 3];
    let mut hi = [0usize; 3];
    let mut found = false;
    for (i, &v) in values.iter().enumerate() {
        if v == 0 {
            continue;
        }
        found = true;
        let idx = [i % nx, (i / nx) % ny, i / (nx * ny)];
        for a in 0..3 {
            lo[a] = lo[a].min(idx[a]);
            hi[a] = hi[a].max(idx[a]);
        }
    }

    if !found {
        return Err(CoreError::empty_mask("no non-zero voxel to bound"));
    }
    Ok(BoundingBox {
        start: lo,
        size: [hi[0] - lo[0] + 1, hi[1] - lo[1] + 1, hi[2] - lo[2] + 1],
    })
}

/// Extract the voxels of `bbox`.
pub fn crop<B: Backend, K: BasicOps<B>>(image: &Image<B, 3, K>, bbox: &BoundingBox) -> Result<Image<B, 3, K>> {
    let size = image.size();
    let end = bbox.end();
    for axis in 0..3 {
        if end[axis] > size[axis] {
            return Err(CoreError::shape_mismatch(&size, &end));
        }
    }
    let frame = image.frame().sub_frame(bbox.start, bbox.size);
    let data = image.data().clone().slice(bbox.tensor_ranges());
    Ok(Image::new(data, frame.origin, frame.spacing, frame.direction))
}

/// Crop to the bounding box of the non-zero voxels of `mask`.
///
/// `mask` must share the grid of `image`.
pub fn crop_to_mask<B: Backend, K: BasicOps<B>>(
    image: &Image<B, 3, K>,
    mask: &LabelImage<B>,
) -> Result<Image<B, 3, K>> {
    if image.size() != mask.size() {
        return Err(CoreError::shape_mismatch(&image.shape(), &mask.shape()));
    }
    let bbox = bounding_box(mask)?;
    debug!(start = ?bbox.start, size = ?bbox.size, "crop to mask");
    crop(image, &bbox)
}

/// Padding `(lower, upper)` per axis to grow `size` to `target`.
fn symmetric_padding(size: [usize; 3], target: [usize; 3]) -> Result<[(usize, usize); 3]> {
    let mut padding = [(0, 0); 3];
    for axis in 0..3 {
        if size[axis] > target[axis] {
            return Err(CoreError::GridOverflow { axis, size, target });
        }
        let diff = target[axis] - size[axis];
        padding[axis] = (diff / 2, diff - diff / 2);
    }
    Ok(padding)
}

fn pad_frame(frame: &Frame, padding: &[(usize, usize); 3], target: [usize; 3]) -> Frame {
    let origin = frame.index_to_physical([
        -(padding[0].0 as f64),
        -(padding[1].0 as f64),
        -(padding[2].0 as f64),
    ]);
    Frame {
        size: target,
        origin,
        ..*frame
    }
}

fn place<B: Backend, K: BasicOps<B>>(
    canvas: Tensor<B, 3, K>,
    data: Tensor<B, 3, K>,
    padding: &[(usize, usize); 3],
) -> Tensor<B, 3, K> {
    let [nz, ny, nx] = data.dims();
    let (lx, ly, lz) = (padding[0].0, padding[1].0, padding[2].0);
    canvas.slice_assign([lz..lz + nz, ly..ly + ny, lx..lx + nx], data)
}

/// Zero-pad `image` symmetrically to `target` (`[nx, ny, nz]`).
///
/// The lower side receives `⌊diff / 2⌋` voxels, the upper side the rest.
/// Fails with [`CoreError::GridOverflow`] if any axis is already larger than
/// the target.
pub fn pad_to_shape<B: Backend>(image: &Image<B, 3>, target: [usize; 3]) -> Result<Image<B, 3>> {
    let padding = symmetric_padding(image.size(), target)?;
    let frame = pad_frame(&image.frame(), &padding, target);
    let canvas = Tensor::<B, 3>::zeros(frame.tensor_shape(), &image.data().device());
    let data = place(canvas, image.data().clone(), &padding);
    Ok(Image::new(data, frame.origin, frame.spacing, frame.direction))
}

/// Label version of [`pad_to_shape`].
pub fn pad_label_to_shape<B: Backend>(label: &LabelImage<B>, target: [usize; 3]) -> Result<LabelImage<B>> {
    let padding = symmetric_padding(label.size(), target)?;
    let frame = pad_frame(&label.frame(), &padding, target);
    let canvas = Tensor::<B, 3, Int>::zeros(frame.tensor_shape(), &label.data().device());
    let data = place(canvas, label.data().clone(), &padding);
    Ok(Image::new(data, frame.origin, frame.spacing, frame.direction))
}

/// Resample `image` to `spacing`, keeping origin and direction.
///
/// The new size along each axis is `round(n · s / s')`, at least one voxel.
pub fn resample_to_spacing<B: Backend>(image: &Image<B, 3>, spacing: Spacing<3>) -> Result<Image<B, 3>> {
    spacing.validate()?;
    let size = image.size();
    let current = image.spacing();
    let mut new_size = [0usize; 3];
    for axis in 0..3 {
        let n = (size[axis] as f64 * current[axis] / spacing[axis]).round();
        new_size[axis] = n.max(1.0) as usize;
    }

    let source = image.frame();
    let frame = Frame::new(new_size, source.origin, spacing, source.direction, source.convention)?;
    debug!(from = ?size, to = ?new_size, "resample to spacing");
    Ok(ResampleImageFilter::new(frame, IdentityTransform, LinearInterpolator::new()).apply(image))
}
