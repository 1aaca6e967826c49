//! Registration engine trait.

use std::path::Path;

use burn::tensor::backend::Backend;
use lesionkit_core::image::Image;

use crate::error::Result;

/// Estimates transforms between two images and persists them.
///
/// Outputs follow the ANTs conventions: the written transforms map points
/// of `fixed` into `moving`.
pub trait RegistrationEngine {
    /// Rigid registration, written as an ITK affine `.mat`.
    fn rigid<B: Backend>(&self, fixed: &Image<B, 3>, moving: &Image<B, 3>, output: &Path) -> Result<()>;

    /// Affine + SyN registration, written as an ITK affine `.mat` and a
    /// displacement field NIfTI.
    fn syn<B: Backend>(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        output_affine: &Path,
        output_warp: &Path,
    ) -> Result<()>;

    /// Name for logs and reports.
    fn name(&self) -> &'static str;
}
