//! Lesion frequency map: the sum of every subject's template-space label.

use std::path::Path;
use std::sync::Mutex;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use lesionkit_core::image::Image;
use tracing::info;

use super::template_space_subject;
use crate::batch::{run_batch, BatchOptions, BatchSummary};
use crate::catalog::SubjectSpec;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Sum of the template-space labels of `specs`, on the template grid.
pub fn accumulate<B: Backend>(
    specs: &[SubjectSpec],
    template: &Image<B, 3>,
    options: BatchOptions,
    device: &B::Device,
) -> Result<(Image<B, 3>, BatchSummary<()>)> {
    let frame = template.frame();
    let total = Mutex::new(Tensor::<B, 3>::zeros(frame.tensor_shape(), device));

    let summary = run_batch("lesion-map", specs, options, |spec| {
        let mut subject = template_space_subject::<B>(spec, &frame, device)?;
        let label = subject.label()?.data().clone().float();
        {
            let mut sum = total
                .lock()
                .map_err(|_| PipelineError::worker("lesion map accumulator poisoned"))?;
            *sum = sum.clone() + label;
        }
        subject.free()
    })?;

    let sum = total
        .into_inner()
        .map_err(|_| PipelineError::worker("lesion map accumulator poisoned"))?;
    Ok((template.with_data(sum), summary))
}

pub fn write_map<B: Backend, P: AsRef<Path>>(path: P, map: &Image<B, 3>) -> Result<()> {
    lesionkit_io::write_nifti(path.as_ref(), map)?;
    info!(path = %path.as_ref().display(), "wrote lesion map");
    Ok(())
}

pub fn run<B: Backend>(config: &PipelineConfig, specs: &[SubjectSpec], device: &B::Device) -> Result<BatchSummary<()>> {
    let template = lesionkit_io::read_nifti::<B, _>(&config.template, device)?;
    let (map, summary) = accumulate::<B>(specs, &template, config.batch_options(), device)?;
    write_map(
        config
            .output_folder
            .join(format!("stat_map_{}.nii.gz", config.dataset_name)),
        &map,
    )?;
    Ok(summary)
}
