//! Similarity metrics for judging registration results.
//!
//! Unlike optimisation losses these return the similarity itself: larger is
//! better for mutual information and correlation. [`MattesMutualInformation`]
//! follows the ANTs sign convention and reports `-MI`.

pub mod trait_;
pub mod histogram;
pub mod mutual_information;
pub mod ncc;

pub use trait_::{sample_overlap, Metric, OverlapSamples};
pub use histogram::JointHistogram;
pub use mutual_information::{MattesMutualInformation, MutualInformation};
pub use ncc::NormalizedCrossCorrelation;
