//! Image filters.
//!
//! Resampling onto a new grid, label transport, crop/pad, masking and
//! intensity normalisation. All filters are pure: inputs are borrowed and
//! a fresh image is returned.

pub mod resample;
pub mod label;
pub mod region;
pub mod intensity;

pub use resample::ResampleImageFilter;
pub use label::{resample_label_to_target, transport_label, transport_parcellation};
pub use region::{
    bounding_box, crop, crop_to_mask, pad_label_to_shape, pad_to_shape,
    resample_to_spacing, BoundingBox,
};
pub use intensity::{mask_image, mask_label, voxel_statistics, z_score, VoxelStatistics};
