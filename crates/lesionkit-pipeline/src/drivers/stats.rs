//! Cohort metadata and lesion components.

use std::path::PathBuf;

use burn::tensor::backend::Backend;
use lesionkit_core::filter::resample_label_to_target;
use lesionkit_core::measure::{
    connected_components, dice_coefficient, label_volume_ml, voxel_count_to_volume_ml, Connectivity,
};
use lesionkit_core::spatial::Spacing;
use tracing::info;

use crate::batch::{run_batch, BatchOptions, BatchSummary};
use crate::catalog::{LabelSource, SubjectSpec};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::report::{format_triple, write_csv, ComponentRow, MetadataRow};
use crate::subject::{LoadOptions, Subject};

/// Report rows of one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectStats {
    pub metadata: MetadataRow,
    pub components: Vec<ComponentRow>,
}

pub fn subject_stats<B: Backend>(
    spec: &SubjectSpec,
    target_shape: [usize; 3],
    target_spacing: Spacing<3>,
    device: &B::Device,
) -> Result<SubjectStats> {
    let flair = lesionkit_io::read_nifti_frame(&spec.flair)?;
    let dwi = lesionkit_io::read_nifti_frame(&spec.dwi)?;

    let mut subject = Subject::<B>::new(spec.clone(), device);
    subject.load(LoadOptions::default())?;
    let label = subject.label()?;

    let found = connected_components(label, Connectivity::Corners26)?;
    let components = found
        .sizes
        .iter()
        .map(|&n| ComponentRow {
            name: spec.name.clone(),
            volume_ml: voxel_count_to_volume_ml(n, label.spacing()),
        })
        .collect::<Vec<_>>();

    // Volume on the grid the label was drawn on.
    let (lesion_volume_ml, flair_lesion_volume_ml, dwi_lesion_volume_ml) = match spec.label_source {
        LabelSource::Volume { .. } => (
            label_volume_ml(&lesionkit_io::read_label::<B, _>(&spec.label, device)?),
            None,
            None,
        ),
        LabelSource::DualAnnotation => {
            let annotation = lesionkit_io::read_dual_annotation::<B, _>(&spec.label, device)?;
            (
                label_volume_ml(label),
                Some(label_volume_ml(&annotation.flair)),
                Some(label_volume_ml(&annotation.dwi)),
            )
        }
    };
    let bet_mask_volume_ml = label_volume_ml(subject.bet_mask()?);

    let before = label.clone();
    subject.extract_brain()?;
    subject.resample_to_canonical(target_shape, target_spacing)?;
    let back = resample_label_to_target(subject.label()?, &before.frame());
    let dice_after_preprocessing = dice_coefficient(&before, &back)?;
    subject.free()?;

    info!(
        subject = %spec.name,
        components = components.len(),
        lesion_volume_ml,
        dice_after_preprocessing,
        "subject stats"
    );
    Ok(SubjectStats {
        metadata: MetadataRow {
            name: spec.name.clone(),
            shape_flair: format_triple(&flair.size),
            shape_dwi: format_triple(&dwi.size),
            voxel_dim_flair: format_triple(&flair.spacing.to_array()),
            voxel_dim_dwi: format_triple(&dwi.spacing.to_array()),
            lesion_volume_ml,
            flair_lesion_volume_ml,
            dwi_lesion_volume_ml,
            bet_mask_volume_ml,
            dice_after_preprocessing,
        },
        components,
    })
}

/// Output files of the stats driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsFiles {
    pub metadata: PathBuf,
    pub components: PathBuf,
}

impl StatsFiles {
    pub fn new(folder: impl Into<PathBuf>, dataset: &str) -> Self {
        let folder = folder.into();
        Self {
            metadata: folder.join(format!("{dataset}_metadata.csv")),
            components: folder.join(format!("{dataset}_components.csv")),
        }
    }
}

pub fn stats_cohort<B: Backend>(
    specs: &[SubjectSpec],
    files: &StatsFiles,
    target_shape: [usize; 3],
    target_spacing: Spacing<3>,
    options: BatchOptions,
    device: &B::Device,
) -> Result<BatchSummary<SubjectStats>> {
    let summary = run_batch("stats", specs, options, |spec| {
        subject_stats::<B>(spec, target_shape, target_spacing, device)
    })?;

    let metadata: Vec<MetadataRow> = summary.results.iter().map(|s| s.metadata.clone()).collect();
    let components: Vec<ComponentRow> = summary
        .results
        .iter()
        .flat_map(|s| s.components.iter().cloned())
        .collect();
    write_csv(&files.metadata, &metadata)?;
    write_csv(&files.components, &components)?;
    Ok(summary)
}

pub fn run<B: Backend>(
    config: &PipelineConfig,
    specs: &[SubjectSpec],
    device: &B::Device,
) -> Result<BatchSummary<SubjectStats>> {
    let files = StatsFiles::new(&config.output_folder, &config.dataset_name);
    stats_cohort::<B>(
        specs,
        &files,
        config.target_shape,
        config.target_spacing(),
        config.batch_options(),
        device,
    )
}
