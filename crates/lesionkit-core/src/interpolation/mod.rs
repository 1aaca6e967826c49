//! Sampling volumes at continuous indices.

pub mod trait_;
pub mod linear;

pub use trait_::{inside_buffer, Interpolator};
pub use linear::LinearInterpolator;
