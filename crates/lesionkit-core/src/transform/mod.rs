//! Spatial transforms.
//!
//! Every transform maps points of an output (reference) grid to points of
//! the input grid being sampled. Registration writes its forward transform
//! in exactly this form, so resampling a moving image onto a fixed grid
//! applies it unchanged.

pub mod trait_;
pub mod identity;
pub mod affine;
pub mod displacement_field;
pub mod chained;

pub use trait_::Transform;
pub use identity::IdentityTransform;
pub use affine::AffineTransform;
pub use displacement_field::{DisplacementFieldTransform, InverseStrategy};
pub use chained::ChainedTransform;
