//! Images and the physical frames they live in.

pub mod image;
pub mod frame;
pub mod grid;

pub use image::{Image, LabelImage};
pub use frame::{decompose_affine, convert_affine, CoordinateConvention, Frame};
pub use grid::index_grid;
