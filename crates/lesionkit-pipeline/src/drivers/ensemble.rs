//! Ensembling model predictions.
//!
//! Every input folder holds the probability maps of one model under the same
//! file names. The lesion probability of each case is averaged across models
//! and thresholded at 0.5; the mask is written as `u8` on the grid of the
//! first model's map.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use burn::tensor::backend::Backend;
use lesionkit_core::image::{Image, LabelImage};
use lesionkit_io::SitkGeometry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::batch::{run_batch, BatchOptions, BatchSummary};
use crate::error::{PipelineError, Result};

pub const THRESHOLD: f32 = 0.5;

/// Lesion class in nnU-Net probability archives.
const FOREGROUND: usize = 1;

/// Which model family produced the probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnsembleMode {
    /// `{case}.npz` archives with a `{case}.json` geometry sidecar.
    #[serde(rename = "nnUNet")]
    NnUnet,
    /// `{case}_ProbMapClass1.nii.gz`
    #[serde(rename = "deepmedic")]
    DeepMedic,
    /// `{case}_probabilities.nii.gz`
    #[serde(rename = "3DUNet")]
    Unet3d,
}

impl EnsembleMode {
    pub fn suffix(self) -> &'static str {
        match self {
            Self::NnUnet => ".npz",
            Self::DeepMedic => "_ProbMapClass1.nii.gz",
            Self::Unet3d => "_probabilities.nii.gz",
        }
    }

    /// Case name of a probability file, `None` for unrelated files.
    pub fn case_name(self, file_name: &str) -> Option<String> {
        file_name
            .strip_suffix(self.suffix())
            .filter(|stem| !stem.is_empty())
            .map(str::to_string)
    }
}

impl fmt::Display for EnsembleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NnUnet => "nnUNet",
            Self::DeepMedic => "deepmedic",
            Self::Unet3d => "3DUNet",
        };
        f.write_str(name)
    }
}

impl FromStr for EnsembleMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nnunet" => Ok(Self::NnUnet),
            "deepmedic" => Ok(Self::DeepMedic),
            "3dunet" => Ok(Self::Unet3d),
            _ => Err(PipelineError::precondition(format!(
                "unknown ensemble mode '{s}', expected nnUNet, deepmedic or 3DUNet"
            ))),
        }
    }
}

/// Cases with a probability file in `folder`, sorted by name.
pub fn list_cases(folder: &Path, mode: EnsembleMode) -> Result<Vec<String>> {
    let mut cases = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {}", folder.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(case) = entry.file_name().to_str().and_then(|name| mode.case_name(name)) {
            cases.push(case);
        }
    }
    cases.sort();
    debug!(folder = %folder.display(), cases = cases.len(), %mode, "listed probability maps");
    Ok(cases)
}

/// Probability map of `case` written by one model.
pub fn read_probability<B: Backend>(
    folder: &Path,
    case: &str,
    mode: EnsembleMode,
    device: &B::Device,
) -> Result<Image<B, 3>> {
    let path = folder.join(format!("{case}{}", mode.suffix()));
    let image = match mode {
        EnsembleMode::NnUnet => {
            let geometry = SitkGeometry::read_json(folder.join(format!("{case}.json")))?;
            lesionkit_io::read_probability_npz::<B, _>(&path, &geometry, FOREGROUND, device)?
        }
        EnsembleMode::DeepMedic | EnsembleMode::Unet3d => lesionkit_io::read_nifti::<B, _>(&path, device)?,
    };
    Ok(image)
}

/// Mean probability of `maps` thresholded at [`THRESHOLD`].
pub fn ensemble_probabilities<B: Backend>(maps: &[Image<B, 3>]) -> Result<LabelImage<B>> {
    let (first, rest) = maps
        .split_first()
        .ok_or_else(|| PipelineError::precondition("nothing to ensemble"))?;
    let mut sum = first.data().clone();
    for map in rest {
        if map.size() != first.size() {
            return Err(PipelineError::consistency(format!(
                "probability maps of shape {:?} and {:?} cannot be ensembled",
                first.size(),
                map.size()
            )));
        }
        sum = sum + map.data().clone();
    }
    let mean = sum.div_scalar(maps.len() as f32);
    Ok(first.with_data(mean.greater_equal_elem(THRESHOLD).int()))
}

/// Ensemble one case and write `{output}/{case}.nii.gz`.
pub fn ensemble_case<B: Backend>(
    mode: EnsembleMode,
    inputs: &[PathBuf],
    case: &str,
    output_folder: &Path,
    device: &B::Device,
) -> Result<PathBuf> {
    let maps = inputs
        .iter()
        .map(|folder| read_probability::<B>(folder, case, mode, device))
        .collect::<Result<Vec<_>>>()?;
    let mask = ensemble_probabilities(&maps)?;
    let output = output_folder.join(format!("{case}.nii.gz"));
    lesionkit_io::write_mask_u8(&output, &mask)?;
    info!(case, models = maps.len(), lesion_voxels = mask.count_nonzero(), "ensembled");
    Ok(output)
}

/// Ensemble every case listed in the first input folder.
pub fn run<B: Backend>(
    mode: EnsembleMode,
    output_folder: &Path,
    inputs: &[PathBuf],
    options: BatchOptions,
    device: &B::Device,
) -> Result<BatchSummary<PathBuf>> {
    let first = inputs
        .first()
        .ok_or_else(|| PipelineError::precondition("at least one input folder is required"))?;
    std::fs::create_dir_all(output_folder)?;
    let cases = list_cases(first, mode)?;
    run_batch("ensemble", &cases, options, |case| {
        ensemble_case::<B>(mode, inputs, case, output_folder, device)
    })
}
