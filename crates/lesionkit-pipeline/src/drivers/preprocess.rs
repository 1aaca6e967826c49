//! Training data for nnU-Net.
//!
//! Each subject is loaded, skull-stripped, brought to the canonical grid,
//! checked, and written into the nnU-Net raw dataset layout:
//!
//! ```text
//! {root}/Dataset001_Strokes/imagesTr/{name}_0000.nii.gz   FLAIR
//! {root}/Dataset001_Strokes/imagesTr/{name}_0001.nii.gz   DWI
//! {root}/Dataset001_Strokes/labelsTr/{name}.nii.gz        label
//! ```

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use lesionkit_core::spatial::Spacing;
use tracing::info;

use crate::batch::{run_batch, BatchOptions, BatchSummary};
use crate::catalog::SubjectSpec;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::subject::{LoadOptions, Subject};

pub const DATASET_NAME: &str = "Dataset001_Strokes";

/// Paths of the nnU-Net raw dataset under `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NnUnetLayout {
    dataset: PathBuf,
}

impl NnUnetLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            dataset: root.as_ref().join(DATASET_NAME),
        }
    }

    pub fn images(&self) -> PathBuf {
        self.dataset.join("imagesTr")
    }

    pub fn labels(&self) -> PathBuf {
        self.dataset.join("labelsTr")
    }

    pub fn flair(&self, name: &str) -> PathBuf {
        self.images().join(format!("{name}_0000.nii.gz"))
    }

    pub fn dwi(&self, name: &str) -> PathBuf {
        self.images().join(format!("{name}_0001.nii.gz"))
    }

    pub fn label(&self, name: &str) -> PathBuf {
        self.labels().join(format!("{name}.nii.gz"))
    }

    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(self.images())?;
        std::fs::create_dir_all(self.labels())?;
        Ok(())
    }
}

/// Canonical training volumes of one subject.
pub fn preprocess_subject<B: Backend>(
    spec: &SubjectSpec,
    layout: &NnUnetLayout,
    target_shape: [usize; 3],
    target_spacing: Spacing<3>,
    device: &B::Device,
) -> Result<()> {
    let mut subject = Subject::<B>::new(spec.clone(), device);
    subject.load(LoadOptions::default())?;
    subject.extract_brain()?;
    subject.resample_to_canonical(target_shape, target_spacing)?;
    subject.check_space_integrity()?;
    subject.check_label_non_empty()?;

    let name = subject.name();
    lesionkit_io::write_nifti(layout.flair(name), subject.flair()?)?;
    lesionkit_io::write_nifti(layout.dwi(name), subject.dwi()?)?;
    lesionkit_io::write_label(layout.label(name), subject.label()?)?;
    info!(subject = name, "wrote nnU-Net training case");

    subject.free()?;
    Ok(())
}

pub fn preprocess_cohort<B: Backend>(
    specs: &[SubjectSpec],
    layout: &NnUnetLayout,
    target_shape: [usize; 3],
    target_spacing: Spacing<3>,
    options: BatchOptions,
    device: &B::Device,
) -> Result<BatchSummary<String>> {
    layout.create()?;
    run_batch("preprocess", specs, options, |spec| {
        preprocess_subject::<B>(spec, layout, target_shape, target_spacing, device)?;
        Ok(spec.name.clone())
    })
}

pub fn run<B: Backend>(config: &PipelineConfig, specs: &[SubjectSpec], device: &B::Device) -> Result<BatchSummary<String>> {
    let layout = NnUnetLayout::new(&config.output_folder);
    preprocess_cohort::<B>(
        specs,
        &layout,
        config.target_shape,
        config.target_spacing(),
        config.batch_options(),
        device,
    )
}
