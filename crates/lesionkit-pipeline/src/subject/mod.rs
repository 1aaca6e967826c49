//! Subject lifecycle.
//!
//! A [`Subject`] owns the four volumes of one case (FLAIR, DWI, lesion
//! label, brain mask) and moves them between spaces:
//!
//! ```text
//! Unloaded ──load──▶ Loaded ──extract_brain──▶ BrainExtracted
//!    ▲                  │  ──resample_to_canonical──▶ CanonicalResampled
//!    └──────free────────┘  ──align_to_template──▶ TemplateAligned
//! ```
//!
//! Every operation except `load` requires loaded volumes; the state only
//! records the last stage applied.

mod slot;

pub use slot::Slot;

use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use lesionkit_core::filter::{
    bounding_box, crop, mask_image, mask_label, pad_to_shape, resample_label_to_target,
    resample_to_spacing, transport_label, z_score, ResampleImageFilter,
};
use lesionkit_core::image::{Frame, Image, LabelImage};
use lesionkit_core::interpolation::LinearInterpolator;
use lesionkit_core::spatial::Spacing;
use lesionkit_core::transform::{AffineTransform, IdentityTransform};
use lesionkit_io::DualAnnotation;
use lesionkit_registration::graph::read_dwi_to_flair;
use lesionkit_registration::{SynTransform, TransformPaths};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{LabelSource, Modality, SubjectSpec};
use crate::error::{PipelineError, Result};

/// Last stage applied to a subject's volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectState {
    Unloaded,
    Loaded,
    BrainExtracted,
    CanonicalResampled,
    TemplateAligned,
}

/// What [`Subject::load`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    pub load_label: bool,
    /// Bring DWI and DWI-space labels onto the FLAIR grid.
    pub transform_to_flair: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            load_label: true,
            transform_to_flair: true,
        }
    }
}

impl LoadOptions {
    pub fn without_label(mut self) -> Self {
        self.load_label = false;
        self
    }

    pub fn native(mut self) -> Self {
        self.transform_to_flair = false;
        self
    }
}

/// One case of a cohort.
#[derive(Debug)]
pub struct Subject<B: Backend> {
    name: String,
    flair: Slot<Image<B, 3>>,
    dwi: Slot<Image<B, 3>>,
    label: Slot<LabelImage<B>>,
    bet_mask: Slot<LabelImage<B>>,
    label_source: LabelSource,
    allow_empty_label: bool,
    state: SubjectState,
    transforms: TransformPaths,
    device: B::Device,
}

fn linear<B: Backend>(image: &Image<B, 3>, transform: &AffineTransform, reference: &Frame) -> Image<B, 3> {
    ResampleImageFilter::new(*reference, transform, LinearInterpolator::new()).apply(image)
}

fn onto<B: Backend>(image: &Image<B, 3>, reference: &Frame) -> Image<B, 3> {
    ResampleImageFilter::new(*reference, IdentityTransform, LinearInterpolator::new()).apply(image)
}

/// Voxelwise OR of two masks on the same grid.
pub(crate) fn mask_union<B: Backend>(a: &LabelImage<B>, b: &LabelImage<B>) -> Result<LabelImage<B>> {
    if a.size() != b.size() {
        return Err(PipelineError::consistency(format!(
            "cannot merge annotations of shape {:?} and {:?}",
            a.size(),
            b.size()
        )));
    }
    let sum = a.nonzero().into_data() + b.nonzero().into_data();
    Ok(a.with_data(sum.greater_elem(0).int()))
}

impl<B: Backend> Subject<B> {
    pub fn new(spec: SubjectSpec, device: &B::Device) -> Self {
        let transforms = TransformPaths::from_flair(&spec.flair);
        Self {
            name: spec.name,
            flair: Slot::new(Some(spec.flair)),
            dwi: Slot::new(Some(spec.dwi)),
            label: Slot::new(Some(spec.label)),
            bet_mask: Slot::new(spec.bet_mask),
            label_source: spec.label_source,
            allow_empty_label: spec.allow_empty_label,
            state: SubjectState::Unloaded,
            transforms,
            device: device.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SubjectState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state != SubjectState::Unloaded
    }

    pub fn transforms(&self) -> &TransformPaths {
        &self.transforms
    }

    pub fn label_source(&self) -> LabelSource {
        self.label_source
    }

    pub fn flair_path(&self) -> Option<&Path> {
        self.flair.path()
    }

    pub fn dwi_path(&self) -> Option<&Path> {
        self.dwi.path()
    }

    pub fn label_path(&self) -> Option<&Path> {
        self.label.path()
    }

    pub fn bet_mask_path(&self) -> Option<&Path> {
        self.bet_mask.path()
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    fn require_loaded(&self, operation: &str) -> Result<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(PipelineError::precondition(format!(
                "{operation} on subject {} requires loaded volumes",
                self.name
            )))
        }
    }

    fn loaded<'a, T>(&self, slot: &'a Slot<T>, what: &str) -> Result<&'a T> {
        slot.volume().ok_or_else(|| {
            PipelineError::precondition(format!("{what} of subject {} is not loaded", self.name))
        })
    }

    fn required_path(&self, path: Option<&Path>, what: &str) -> Result<PathBuf> {
        path.map(Path::to_path_buf).ok_or_else(|| {
            PipelineError::precondition(format!("subject {} has no {what} path", self.name))
        })
    }

    pub fn flair(&self) -> Result<&Image<B, 3>> {
        self.loaded(&self.flair, "FLAIR")
    }

    pub fn dwi(&self) -> Result<&Image<B, 3>> {
        self.loaded(&self.dwi, "DWI")
    }

    pub fn label(&self) -> Result<&LabelImage<B>> {
        self.loaded(&self.label, "label")
    }

    pub fn bet_mask(&self) -> Result<&LabelImage<B>> {
        self.loaded(&self.bet_mask, "brain mask")
    }

    /// Read every volume from disk.
    pub fn load(&mut self, options: LoadOptions) -> Result<()> {
        if self.is_loaded() {
            return Err(PipelineError::precondition(format!(
                "subject {} is already loaded",
                self.name
            )));
        }
        info!(subject = %self.name, ?options, "loading");

        let flair_path = self.required_path(self.flair.path(), "FLAIR")?;
        let dwi_path = self.required_path(self.dwi.path(), "DWI")?;
        let flair = lesionkit_io::read_nifti::<B, _>(&flair_path, &self.device)?;
        let mut dwi = lesionkit_io::read_nifti::<B, _>(&dwi_path, &self.device)?;
        let flair_frame = flair.frame();

        let dwi_to_flair = if options.transform_to_flair {
            Some(read_dwi_to_flair(&self.transforms)?)
        } else {
            None
        };
        if let Some(transform) = &dwi_to_flair {
            dwi = linear(&dwi, transform, &flair_frame);
        }

        let label = if options.load_label {
            Some(self.read_label(&flair_frame, dwi_to_flair.as_ref())?)
        } else {
            None
        };

        let bet_mask = match self.bet_mask.path() {
            Some(path) => lesionkit_io::read_label::<B, _>(path, &self.device)?,
            None => flair.with_data(flair.data().clone().not_equal_elem(0.0).int()),
        };
        debug!(subject = %self.name, flair = ?flair_frame.size, dwi = ?dwi.size(), "loaded volumes");

        self.flair.set(flair);
        self.dwi.set(dwi);
        if let Some(label) = label {
            self.label.set(label);
        }
        self.bet_mask.set(bet_mask);
        self.state = SubjectState::Loaded;
        Ok(())
    }

    fn read_label(&self, flair: &Frame, dwi_to_flair: Option<&AffineTransform>) -> Result<LabelImage<B>> {
        let path = self.required_path(self.label.path(), "label")?;
        match self.label_source {
            LabelSource::DualAnnotation => {
                if !path.is_file() {
                    return Err(PipelineError::Io(anyhow::anyhow!(
                        "annotation {} does not exist",
                        path.display()
                    )));
                }
                let DualAnnotation {
                    flair: mut on_flair,
                    dwi: mut on_dwi,
                } = lesionkit_io::read_dual_annotation::<B, _>(&path, &self.device)
                    .map_err(|e| PipelineError::cohort_data(format!("{e:#}")))?;

                if on_flair.size() != flair.size {
                    on_flair = resample_label_to_target(&on_flair, flair);
                }
                if on_dwi.size() != flair.size {
                    on_dwi = resample_label_to_target(&on_dwi, flair);
                }
                if let Some(transform) = dwi_to_flair {
                    on_dwi = transport_label(&on_dwi, transform, flair);
                }
                mask_union(&on_flair, &on_dwi)
            }
            LabelSource::Volume { modality } => {
                let label = lesionkit_io::read_label::<B, _>(&path, &self.device)?;
                match (modality, dwi_to_flair) {
                    (Modality::Dwi, Some(transform)) => Ok(transport_label(&label, transform, flair)),
                    _ => Ok(label),
                }
            }
        }
    }

    /// Zero everything outside the brain mask.
    pub fn extract_brain(&mut self) -> Result<()> {
        self.require_loaded("extract_brain")?;
        let mask = self.bet_mask()?;
        let flair = mask_image(self.flair()?, mask)?;
        let dwi = mask_image(self.dwi()?, mask)?;
        let label = match self.label.volume() {
            Some(label) => Some(mask_label(label, mask)?),
            None => None,
        };

        self.flair.set(flair);
        self.dwi.set(dwi);
        if let Some(label) = label {
            self.label.set(label);
        }
        self.state = SubjectState::BrainExtracted;
        Ok(())
    }

    /// Crop to the brain, resample to `target_spacing` and pad to
    /// `target_shape` (`[nx, ny, nz]`).
    ///
    /// The brain must fit: a bounding box that is larger than the target
    /// after resampling is a consistency error, never silently clipped.
    pub fn resample_to_canonical(&mut self, target_shape: [usize; 3], target_spacing: Spacing<3>) -> Result<()> {
        self.require_loaded("resample_to_canonical")?;
        let mask = self.bet_mask()?;
        let bbox = bounding_box(mask)?;
        debug!(subject = %self.name, start = ?bbox.start, size = ?bbox.size, "brain bounding box");

        let flair = crop(self.flair()?, &bbox)?;
        let dwi = crop(self.dwi()?, &bbox)?;
        let label = match self.label.volume() {
            Some(label) => Some(crop(label, &bbox)?),
            None => None,
        };

        let flair = resample_to_spacing(&flair, target_spacing)?;
        let size = flair.size();
        if let Some(axis) = (0..3).find(|&axis| size[axis] > target_shape[axis]) {
            warn!(
                subject = %self.name,
                axis,
                size = ?size,
                target = ?target_shape,
                "brain does not fit the canonical grid"
            );
            return Err(PipelineError::consistency(format!(
                "subject {}: brain of {:?} voxels at {:?} mm exceeds the canonical grid {:?} along axis {axis}",
                self.name,
                size,
                target_spacing.to_array(),
                target_shape
            )));
        }
        let flair = pad_to_shape(&flair, target_shape)?;
        let frame = flair.frame();

        let dwi = onto(&dwi, &frame);
        let label = label.map(|label| resample_label_to_target(&label, &frame));
        let bet_mask = resample_label_to_target(mask, &frame);

        if flair.size() != target_shape || flair.spacing().to_array() != target_spacing.to_array() {
            return Err(PipelineError::consistency(format!(
                "subject {}: canonical FLAIR has shape {:?} and spacing {:?}, expected {:?} and {:?}",
                self.name,
                flair.size(),
                flair.spacing().to_array(),
                target_shape,
                target_spacing.to_array()
            )));
        }

        self.flair.set(flair);
        self.dwi.set(dwi);
        if let Some(label) = label {
            self.label.set(label);
        }
        self.bet_mask.set(bet_mask);
        self.state = SubjectState::CanonicalResampled;
        Ok(())
    }

    /// Z-score FLAIR and DWI independently.
    pub fn normalize(&mut self) -> Result<()> {
        self.require_loaded("normalize")?;
        let flair = z_score(self.flair()?)?;
        let dwi = z_score(self.dwi()?)?;
        self.flair.set(flair);
        self.dwi.set(dwi);
        Ok(())
    }

    /// Move every volume onto `template` through the stored SyN result.
    pub fn align_to_template(&mut self, template: &Frame) -> Result<()> {
        self.require_loaded("align_to_template")?;
        let syn = SynTransform::<B>::read(&self.transforms, &self.device)?;
        info!(subject = %self.name, template = ?template.size, "aligning to template");

        let flair = syn.align_image(self.flair()?, template);
        let dwi = syn.align_image(self.dwi()?, template);
        let bet_mask = syn.align_label(self.bet_mask()?, template);
        let label = self.label.volume().map(|label| syn.align_label(label, template));

        self.flair.set(flair);
        self.dwi.set(dwi);
        self.bet_mask.set(bet_mask);
        if let Some(label) = label {
            self.label.set(label);
        }
        self.state = SubjectState::TemplateAligned;
        Ok(())
    }

    /// FLAIR, DWI and label share shape, spacing and direction.
    pub fn check_space_integrity(&self) -> Result<()> {
        self.require_loaded("check_space_integrity")?;
        let flair = self.flair()?;
        let dwi = self.dwi()?;
        let label = self.label()?;

        if flair.size() != dwi.size() || flair.size() != label.size() {
            return Err(PipelineError::consistency(format!(
                "subject {}: shape mismatch, FLAIR {:?}, DWI {:?}, label {:?}",
                self.name,
                flair.size(),
                dwi.size(),
                label.size()
            )));
        }
        let spacing = flair.spacing().to_array();
        if spacing != dwi.spacing().to_array() || spacing != label.spacing().to_array() {
            return Err(PipelineError::consistency(format!(
                "subject {}: spacing mismatch, FLAIR {:?}, DWI {:?}, label {:?}",
                self.name,
                spacing,
                dwi.spacing().to_array(),
                label.spacing().to_array()
            )));
        }
        if !flair.direction().approx_eq(dwi.direction()) || !flair.direction().approx_eq(label.direction()) {
            return Err(PipelineError::consistency(format!(
                "subject {}: direction mismatch between FLAIR, DWI and label",
                self.name
            )));
        }
        Ok(())
    }

    /// The label marks at least one voxel, unless the cohort lists this
    /// subject as lesion free.
    pub fn check_label_non_empty(&self) -> Result<()> {
        self.require_loaded("check_label_non_empty")?;
        if self.label()?.count_nonzero() > 0 || self.allow_empty_label {
            Ok(())
        } else {
            Err(PipelineError::EmptyLabel(self.name.clone()))
        }
    }

    /// Write every loaded volume into `folder`.
    pub fn save<P: AsRef<Path>>(&self, folder: P) -> Result<()> {
        self.require_loaded("save")?;
        let folder = folder.as_ref();
        std::fs::create_dir_all(folder)?;
        lesionkit_io::write_nifti(folder.join(format!("{}_flair.nii.gz", self.name)), self.flair()?)?;
        lesionkit_io::write_nifti(folder.join(format!("{}_dwi.nii.gz", self.name)), self.dwi()?)?;
        if let Some(label) = self.label.volume() {
            lesionkit_io::write_label(folder.join(format!("{}_label.nii.gz", self.name)), label)?;
        }
        lesionkit_io::write_label(folder.join(format!("{}_BETmask.nii.gz", self.name)), self.bet_mask()?)?;
        info!(subject = %self.name, folder = %folder.display(), "saved");
        Ok(())
    }

    /// Drop every volume; the constructor paths stay.
    pub fn free(&mut self) -> Result<()> {
        self.require_loaded("free")?;
        self.flair.clear();
        self.dwi.clear();
        self.label.clear();
        self.bet_mask.clear();
        self.state = SubjectState::Unloaded;
        debug!(subject = %self.name, "freed");
        Ok(())
    }
}
