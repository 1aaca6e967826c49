//! Registration side of lesionkit.
//!
//! Estimation is delegated to a [`RegistrationEngine`]; the default one runs
//! the ANTs command-line tools. What this crate owns is everything around
//! it: where a subject's transforms live on disk, how they are read back
//! into a [`TransformGraph`], how images and labels are carried through them,
//! and how registration quality is measured afterwards.

pub mod error;
pub mod layout;
pub mod graph;
pub mod engine;
pub mod metric;

pub use error::{RegistrationError, Result};
pub use layout::TransformPaths;
pub use graph::{SynTransform, TransformGraph};
pub use engine::{AntsCliEngine, RegistrationEngine};
