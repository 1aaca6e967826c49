//! Regional lesion burden per lobe and hemisphere.
//!
//! The lobe parcellation is carried onto the template grid once. The
//! hemispheres are split at the voxel column holding the physical origin
//! `(0, 0, 0)`: in MNI space that is the midsagittal plane.
//!
//! Which side of the split is left follows the template's x direction.
//! Tools that always call the low-index half left report swapped
//! hemispheres for templates stored with LPS +x direction.

use burn::tensor::backend::Backend;
use lesionkit_core::filter::transport_parcellation;
use lesionkit_core::image::{Frame, LabelImage};
use lesionkit_core::spatial::Point;
use lesionkit_core::transform::IdentityTransform;
use tracing::{debug, info};

use super::template_space_subject;
use crate::batch::{run_batch, BatchOptions, BatchSummary};
use crate::catalog::SubjectSpec;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::report::{write_csv, AtlasRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Lobe ids and hemisphere of every template voxel.
#[derive(Debug, Clone)]
pub struct LobeAtlas {
    frame: Frame,
    lobes: Vec<i64>,
    left: Vec<bool>,
    max_lobe: i64,
}

impl LobeAtlas {
    pub fn new<B: Backend>(atlas: &LabelImage<B>, template: &Frame) -> Result<Self> {
        let lobes = transport_parcellation(atlas, IdentityTransform, template)?.values()?;
        let max_lobe = lobes.iter().copied().max().unwrap_or(0).max(0);

        let [nx, ny, nz] = template.size;
        let center = template.physical_to_index(&Point::origin())[0].round();
        let split = center.clamp(0.0, nx as f64) as usize;
        // Index x grows towards the patient's right when the x axis points
        // away from LPS +x (the usual RAS-stored template).
        let low_is_left = template.direction[(0, 0)] < 0.0;
        debug!(split, low_is_left, max_lobe, "hemisphere split");

        let mut left = Vec::with_capacity(nx * ny * nz);
        for _ in 0..nz * ny {
            left.extend((0..nx).map(|x| (x < split) == low_is_left));
        }

        Ok(Self {
            frame: *template,
            lobes,
            left,
            max_lobe,
        })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn max_lobe(&self) -> i64 {
        self.max_lobe
    }

    pub fn hemisphere(&self, voxel: usize) -> Hemisphere {
        if self.left[voxel] {
            Hemisphere::Left
        } else {
            Hemisphere::Right
        }
    }

    /// Lesion volume in ml for every lobe `0..=max_lobe` and both
    /// hemispheres, lobe-major with left before right.
    pub fn lesion_volumes<B: Backend>(&self, label: &LabelImage<B>) -> Result<Vec<(i64, Hemisphere, f64)>> {
        if label.size() != self.frame.size {
            return Err(PipelineError::consistency(format!(
                "label of shape {:?} is not on the atlas grid {:?}",
                label.size(),
                self.frame.size
            )));
        }
        let lesion = label.values()?;
        let lobes = (self.max_lobe + 1) as usize;
        let mut sums = vec![[0i64; 2]; lobes];
        for (voxel, (&lobe, &value)) in self.lobes.iter().zip(lesion.iter()).enumerate() {
            if lobe < 0 || value == 0 {
                continue;
            }
            let side = if self.left[voxel] { 0 } else { 1 };
            sums[lobe as usize][side] += value;
        }

        let voxel_ml = label.spacing().voxel_volume() / 1000.0;
        Ok(sums
            .iter()
            .enumerate()
            .flat_map(|(lobe, [left, right])| {
                [
                    (lobe as i64, Hemisphere::Left, *left as f64 * voxel_ml),
                    (lobe as i64, Hemisphere::Right, *right as f64 * voxel_ml),
                ]
            })
            .collect())
    }
}

pub fn atlas_cohort<B: Backend>(
    specs: &[SubjectSpec],
    dataset: &str,
    atlas: &LobeAtlas,
    options: BatchOptions,
    device: &B::Device,
) -> Result<BatchSummary<Vec<AtlasRow>>> {
    run_batch("lesion-atlas", specs, options, |spec| {
        let mut subject = template_space_subject::<B>(spec, atlas.frame(), device)?;
        let rows = atlas
            .lesion_volumes(subject.label()?)?
            .into_iter()
            .map(|(lobe, hemisphere, volume_ml)| AtlasRow {
                dataset: dataset.to_string(),
                subject: spec.name.clone(),
                hemisphere: hemisphere.as_str().to_string(),
                lobe,
                volume_ml,
            })
            .collect();
        subject.free()?;
        Ok(rows)
    })
}

pub fn run<B: Backend>(
    config: &PipelineConfig,
    specs: &[SubjectSpec],
    device: &B::Device,
) -> Result<BatchSummary<Vec<AtlasRow>>> {
    let template = lesionkit_io::read_nifti_frame(&config.template)?;
    let parcellation = lesionkit_io::read_label::<B, _>(&config.atlas, device)?;
    let atlas = LobeAtlas::new(&parcellation, &template)?;
    info!(lobes = atlas.max_lobe() + 1, "atlas on template grid");

    let summary = atlas_cohort::<B>(specs, &config.dataset_name, &atlas, config.batch_options(), device)?;
    let rows: Vec<AtlasRow> = summary.results.iter().flatten().cloned().collect();
    write_csv(
        config
            .output_folder
            .join(format!("stat_lobes_{}.csv", config.dataset_name)),
        &rows,
    )?;
    Ok(summary)
}
