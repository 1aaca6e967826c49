//! Registration estimation.

pub mod trait_;
pub mod ants;

pub use trait_::RegistrationEngine;
pub use ants::AntsCliEngine;
