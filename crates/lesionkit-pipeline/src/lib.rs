//! Stroke lesion pipeline.
//!
//! A cohort is described by a catalog of [`SubjectSpec`]s. Each spec becomes
//! a [`Subject`] that loads its FLAIR, DWI, lesion label and brain mask and
//! moves them between native, canonical and template space. The drivers in
//! [`drivers`] run one such lifecycle per subject over a whole cohort and
//! write the results as NIfTI volumes and CSV reports.

pub mod error;
pub mod config;
pub mod catalog;
pub mod subject;
pub mod batch;
pub mod report;
pub mod worker;
pub mod drivers;

pub use error::{PipelineError, Result};
pub use config::{IsolationPolicy, PipelineConfig};
pub use catalog::{LabelSource, Modality, SubjectSpec};
pub use subject::{LoadOptions, Slot, Subject, SubjectState};
pub use batch::{run_batch, BatchOptions, BatchSummary, SubjectFailure};
pub use worker::{WorkerOutput, WorkerTask};
