//! Physical-space value types.
//!
//! Thin wrappers around `nalgebra` fixed-size types. All coordinates are
//! millimetres in LPS world space unless a [`crate::image::Frame`] says
//! otherwise.

pub mod point;
pub mod vector;
pub mod spacing;
pub mod direction;

pub use point::Point;
pub use vector::Vector;
pub use spacing::Spacing;
pub use direction::Direction;

pub type Point3 = Point<3>;
pub type Vector3 = Vector<3>;
pub type Spacing3 = Spacing<3>;
pub type Direction3 = Direction<3>;

/// Tolerance used when comparing direction cosines and spacings.
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;
