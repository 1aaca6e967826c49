//! Cohort-level drivers. Each one maps a per-subject unit over the catalog
//! with [`crate::batch::run_batch`] and writes its outputs under the
//! configured output folder.

pub mod registration;
pub mod preprocess;
pub mod stats;
pub mod lesion_map;
pub mod lesion_atlas;
pub mod similarity;
pub mod evaluate;
pub mod ensemble;

use burn::tensor::backend::Backend;
use lesionkit_core::image::Frame;

use crate::catalog::SubjectSpec;
use crate::error::Result;
use crate::subject::{LoadOptions, Subject};

/// Load a subject, strip the skull and bring it onto `template`, checking
/// the result on the way.
pub(crate) fn template_space_subject<B: Backend>(
    spec: &SubjectSpec,
    template: &Frame,
    device: &B::Device,
) -> Result<Subject<B>> {
    let mut subject = Subject::<B>::new(spec.clone(), device);
    subject.load(LoadOptions::default())?;
    subject.extract_brain()?;
    subject.align_to_template(template)?;
    subject.check_space_integrity()?;
    subject.check_label_non_empty()?;
    Ok(subject)
}
