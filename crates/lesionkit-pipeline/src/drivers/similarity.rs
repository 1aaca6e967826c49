//! Registration quality: how well the DWI resampled onto FLAIR matches the
//! native DWI and the FLAIR itself.

use burn::tensor::backend::Backend;
use lesionkit_core::image::Image;
use lesionkit_core::transform::IdentityTransform;
use lesionkit_registration::metric::{MattesMutualInformation, Metric, MutualInformation};
use tracing::info;

use crate::batch::{run_batch, BatchSummary};
use crate::catalog::SubjectSpec;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::report::{write_csv, SimilarityRow};
use crate::subject::{LoadOptions, Subject};
use crate::worker::{dispatch, WorkerOutput, WorkerTask};

pub const DWI_DWI: &str = "DWI-DWI";
pub const DWI_FLAIR: &str = "DWI-FLAIR";

fn row<B: Backend>(
    dataset: &str,
    subject: &str,
    kind: &str,
    fixed: &Image<B, 3>,
    moving: &Image<B, 3>,
) -> Result<SimilarityRow> {
    let mutual_information = MutualInformation::default().evaluate(fixed, moving, &IdentityTransform)?;
    let similarity = MattesMutualInformation::default().evaluate(fixed, moving, &IdentityTransform)?;
    Ok(SimilarityRow {
        dataset: dataset.to_string(),
        subject: subject.to_string(),
        kind: kind.to_string(),
        mutual_information,
        similarity,
    })
}

/// Both similarity rows of one subject.
pub fn measure_subject<B: Backend>(spec: &SubjectSpec, dataset: &str, device: &B::Device) -> Result<Vec<SimilarityRow>> {
    let mut subject = Subject::<B>::new(spec.clone(), device);
    subject.load(LoadOptions::default().without_label().native())?;
    let dwi_native = subject.dwi()?.clone();
    subject.free()?;

    subject.load(LoadOptions::default().without_label())?;
    let dwi = subject.dwi()?;
    let rows = vec![
        row(dataset, &spec.name, DWI_DWI, dwi, &dwi_native)?,
        row(dataset, &spec.name, DWI_FLAIR, dwi, subject.flair()?)?,
    ];
    subject.free()?;
    info!(
        subject = %spec.name,
        dwi_dwi = rows[0].mutual_information,
        dwi_flair = rows[1].mutual_information,
        "similarity"
    );
    Ok(rows)
}

pub fn run<B: Backend>(
    config: &PipelineConfig,
    specs: &[SubjectSpec],
    device: &B::Device,
) -> Result<BatchSummary<Vec<SimilarityRow>>> {
    let summary = run_batch("similarity", specs, config.batch_options(), |spec| {
        let task = WorkerTask::Similarity {
            subject: spec.clone(),
            dataset: config.dataset_name.clone(),
        };
        match dispatch::<B>(&task, config.isolation, device)? {
            WorkerOutput::Similarity(rows) => Ok(rows),
            other => Err(PipelineError::worker(format!(
                "similarity {}: unexpected reply {other:?}",
                spec.name
            ))),
        }
    })?;

    let rows: Vec<SimilarityRow> = summary.results.iter().flatten().cloned().collect();
    write_csv(
        config
            .output_folder
            .join(format!("registration_similarity_{}.csv", config.dataset_name)),
        &rows,
    )?;
    Ok(summary)
}
