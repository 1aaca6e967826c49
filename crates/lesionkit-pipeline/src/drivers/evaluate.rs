//! Scoring predicted lesion masks against the ground truth.
//!
//! Predictions are read from `{input}/{subject}.nii.gz`. When they were made
//! in template space they are first carried back to the native FLAIR grid
//! through the inverted SyN transform. Voxels outside the brain mask are
//! ignored by every score.

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use lesionkit_core::filter::resample_label_to_target;
use lesionkit_core::measure::{stat_scores, voxel_count_to_volume_ml};
use lesionkit_core::transform::InverseStrategy;
use lesionkit_registration::SynTransform;
use tracing::info;

use crate::batch::{run_batch, BatchOptions, BatchSummary};
use crate::catalog::SubjectSpec;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::report::{write_csv, EvaluationRow};
use crate::subject::{LoadOptions, Subject};

/// Where predictions come from and which space they are in.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionSource {
    pub folder: PathBuf,
    /// Set when predictions live on the template grid.
    pub template_inverse: Option<InverseStrategy>,
}

impl PredictionSource {
    pub fn native<P: Into<PathBuf>>(folder: P) -> Self {
        Self {
            folder: folder.into(),
            template_inverse: None,
        }
    }

    pub fn template<P: Into<PathBuf>>(folder: P, strategy: InverseStrategy) -> Self {
        Self {
            folder: folder.into(),
            template_inverse: Some(strategy),
        }
    }

    pub fn path(&self, subject: &str) -> PathBuf {
        self.folder.join(format!("{subject}.nii.gz"))
    }
}

pub fn evaluate_subject<B: Backend>(
    spec: &SubjectSpec,
    source: &PredictionSource,
    device: &B::Device,
) -> Result<EvaluationRow> {
    let mut subject = Subject::<B>::new(spec.clone(), device);
    subject.load(LoadOptions::default())?;
    let gt = subject.label()?;
    let native = gt.frame();

    let mut prediction = lesionkit_io::read_label::<B, _>(source.path(&spec.name), device)?;
    if let Some(strategy) = source.template_inverse {
        let syn = SynTransform::<B>::read(subject.transforms(), device)?;
        prediction = syn.inverse(strategy)?.apply_to_label(&prediction, &native);
    }
    let prediction = resample_label_to_target(&prediction, &native);
    if prediction.size() != gt.size() {
        return Err(PipelineError::consistency(format!(
            "shape mismatch: {:?} != {:?}",
            gt.size(),
            prediction.size()
        )));
    }
    if prediction.spacing().to_array() != gt.spacing().to_array() {
        return Err(PipelineError::consistency(format!(
            "spacing mismatch: {:?} != {:?}",
            gt.spacing().to_array(),
            prediction.spacing().to_array()
        )));
    }

    let scores = stat_scores(&prediction, gt, subject.bet_mask()?)?;
    let spacing = gt.spacing();
    let [tp, fp, tn, fn_, _support] = scores.to_volume_ml(spacing);
    let row = EvaluationRow {
        subject: spec.name.clone(),
        tp,
        fp,
        tn,
        fn_,
        dc: scores.dice(),
        pred_volume: voxel_count_to_volume_ml(scores.tp + scores.fp, spacing),
        gt_volume: voxel_count_to_volume_ml(scores.tp + scores.fn_, spacing),
    };
    subject.free()?;
    info!(subject = %row.subject, dice = row.dc, "evaluated");
    Ok(row)
}

pub fn evaluate_cohort<B: Backend>(
    specs: &[SubjectSpec],
    source: &PredictionSource,
    output: &Path,
    options: BatchOptions,
    device: &B::Device,
) -> Result<BatchSummary<EvaluationRow>> {
    let summary = run_batch("evaluate", specs, options, |spec| {
        evaluate_subject::<B>(spec, source, device)
    })?;
    write_csv(output, &summary.results)?;
    Ok(summary)
}

pub fn run<B: Backend>(
    config: &PipelineConfig,
    specs: &[SubjectSpec],
    input_folder: &Path,
    output_file: &Path,
    mni: bool,
    device: &B::Device,
) -> Result<BatchSummary<EvaluationRow>> {
    let source = if mni {
        PredictionSource::template(input_folder, config.inverse_strategy)
    } else {
        PredictionSource::native(input_folder)
    };
    evaluate_cohort::<B>(specs, &source, output_file, config.batch_options(), device)
}
