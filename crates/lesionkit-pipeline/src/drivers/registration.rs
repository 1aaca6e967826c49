//! Transform estimation.
//!
//! Per subject: SyN from the brain-masked FLAIR to the template, then a
//! rigid DWI → FLAIR registration. Results land in the subject's transform
//! layout next to the FLAIR volume.

use burn::tensor::backend::Backend;
use lesionkit_core::filter::mask_image;
use lesionkit_core::image::Image;
use lesionkit_registration::{RegistrationEngine, TransformPaths};
use tracing::info;

use crate::batch::{run_batch, BatchOptions, BatchSummary};
use crate::catalog::SubjectSpec;
use crate::config::{IsolationPolicy, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::subject::{LoadOptions, Subject};
use crate::worker::{dispatch, WorkerOutput, WorkerTask};

/// Estimate and write the transforms of one subject.
pub fn register_subject<B: Backend, E: RegistrationEngine>(
    spec: &SubjectSpec,
    template: &Image<B, 3>,
    engine: &E,
    device: &B::Device,
) -> Result<TransformPaths> {
    let mut subject = Subject::<B>::new(spec.clone(), device);
    subject.load(LoadOptions::default().without_label().native())?;
    let paths = subject.transforms().clone();

    let flair_brain = mask_image(subject.flair()?, subject.bet_mask()?)?;
    info!(subject = subject.name(), engine = engine.name(), "SyN FLAIR brain → template");
    engine.syn(
        template,
        &flair_brain,
        &paths.flair_to_template_affine,
        &paths.flair_to_template_warp,
    )?;

    info!(subject = subject.name(), engine = engine.name(), "rigid DWI → FLAIR");
    engine.rigid(subject.flair()?, subject.dwi()?, &paths.dwi_to_flair)?;

    subject.free()?;
    Ok(paths)
}

/// Register every subject in this process with `engine`.
pub fn register_cohort<B: Backend, E: RegistrationEngine + Sync>(
    specs: &[SubjectSpec],
    template: &Image<B, 3>,
    engine: &E,
    options: BatchOptions,
    device: &B::Device,
) -> Result<BatchSummary<TransformPaths>> {
    run_batch("register", specs, options, |spec| {
        register_subject::<B, E>(spec, template, engine, device)
    })
}

/// Register every subject with the configured ANTs engine and isolation.
pub fn run<B: Backend>(
    config: &PipelineConfig,
    specs: &[SubjectSpec],
    device: &B::Device,
) -> Result<BatchSummary<TransformPaths>> {
    let engine = config.engine();
    if config.isolation == IsolationPolicy::InProcess {
        let template = lesionkit_io::read_nifti::<B, _>(&config.template, device)?;
        return register_cohort(specs, &template, &engine, config.batch_options(), device);
    }

    run_batch("register", specs, config.batch_options(), |spec| {
        let task = WorkerTask::Register {
            subject: spec.clone(),
            template: config.template.clone(),
            engine: engine.clone(),
        };
        match dispatch::<B>(&task, config.isolation, device)? {
            WorkerOutput::Registered(paths) => Ok(paths),
            other => Err(PipelineError::worker(format!(
                "register {}: unexpected reply {other:?}",
                spec.name
            ))),
        }
    })
}
