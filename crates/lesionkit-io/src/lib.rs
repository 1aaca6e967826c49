//! File formats used by the lesion pipeline.
//!
//! Every reader returns images in LPS physical space; every writer accepts
//! LPS images and converts to the on-disk convention of its format.

pub mod nifti_io;
pub mod field_io;
pub mod transform_io;
pub mod nrrd_io;
pub mod npz_io;

pub use nifti_io::{read_label, read_nifti, read_nifti_frame, write_label, write_mask_u8, write_nifti};
pub use field_io::{read_displacement_field, write_displacement_field};
pub use transform_io::{read_itk_affine, write_itk_affine};
pub use nrrd_io::{read_dual_annotation, DualAnnotation};
pub use npz_io::{read_probability_npz, SitkGeometry};
