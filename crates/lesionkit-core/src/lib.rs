//! Core geometry for stroke lesion volumes.
//!
//! Images are `burn` tensors stored `[z, y, x]` together with the physical
//! frame (origin, spacing, direction) that places them in LPS world space.
//! Transforms map points of an output grid to points of an input grid, the
//! same direction a resampler walks them.

pub mod error;
pub mod spatial;
pub mod image;
pub mod transform;
pub mod interpolation;
pub mod filter;
pub mod measure;

pub use error::{CoreError, Result};
pub use image::{Image, LabelImage, Frame, CoordinateConvention};
pub use spatial::{Point, Vector, Spacing, Direction};
