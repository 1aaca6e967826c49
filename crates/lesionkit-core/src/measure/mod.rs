//! Measures on label volumes: overlap, volume and connected components.

pub mod overlap;
pub mod volume;
pub mod components;

pub use overlap::{dice_coefficient, stat_scores, subtract_masks, StatScores};
pub use volume::{label_volume_ml, voxel_count_to_volume_ml};
pub use components::{connected_components, Components, Connectivity};
