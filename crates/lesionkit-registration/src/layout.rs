//! On-disk layout of a subject's transforms.
//!
//! Everything hangs off the directory holding the native FLAIR:
//!
//! ```text
//! {flair_dir}/dwi_to_flair_affine.mat          rigid, fixed = FLAIR, moving = DWI
//! {flair_dir}/flair_brain_to_mni/affine.mat    SyN affine stage
//! {flair_dir}/flair_brain_to_mni/warp.nii.gz   SyN displacement field
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DWI_TO_FLAIR: &str = "dwi_to_flair_affine.mat";
pub const TEMPLATE_DIR: &str = "flair_brain_to_mni";
pub const TEMPLATE_AFFINE: &str = "affine.mat";
pub const TEMPLATE_WARP: &str = "warp.nii.gz";

/// Transform locations of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformPaths {
    pub dwi_to_flair: PathBuf,
    pub flair_to_template_affine: PathBuf,
    pub flair_to_template_warp: PathBuf,
}

impl TransformPaths {
    /// Layout for the FLAIR volume at `flair`.
    pub fn from_flair<P: AsRef<Path>>(flair: P) -> Self {
        let dir = flair
            .as_ref()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let template_dir = dir.join(TEMPLATE_DIR);
        Self {
            dwi_to_flair: dir.join(DWI_TO_FLAIR),
            flair_to_template_affine: template_dir.join(TEMPLATE_AFFINE),
            flair_to_template_warp: template_dir.join(TEMPLATE_WARP),
        }
    }

    /// All transforms exist.
    pub fn is_complete(&self) -> bool {
        self.dwi_to_flair.is_file()
            && self.flair_to_template_affine.is_file()
            && self.flair_to_template_warp.is_file()
    }
}
