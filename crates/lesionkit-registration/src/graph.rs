//! Per-subject transform graph.
//!
//! Three frames are connected: native DWI, native FLAIR and the template.
//! Edges are stored the way ANTs writes them, as point maps from the fixed
//! grid into the moving image:
//!
//! * `dwi_to_flair`: FLAIR points → DWI points (rigid),
//! * `flair_to_template`: template points → FLAIR points, `affine ∘ warp`.

use std::path::Path;

use burn::tensor::backend::Backend;
use lesionkit_core::filter::{transport_label, ResampleImageFilter};
use lesionkit_core::image::{Frame, Image, LabelImage};
use lesionkit_core::interpolation::LinearInterpolator;
use lesionkit_core::transform::{
    AffineTransform, ChainedTransform, DisplacementFieldTransform, InverseStrategy,
};
use lesionkit_core::CoreError;
use tracing::debug;

use crate::error::{RegistrationError, Result};
use crate::layout::TransformPaths;

fn require(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RegistrationError::MissingTransform(path.to_path_buf()))
    }
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> RegistrationError {
    RegistrationError::transform_io(format!("{}: {err:#}", path.display()))
}

/// Read the rigid DWI → FLAIR transform.
pub fn read_dwi_to_flair(paths: &TransformPaths) -> Result<AffineTransform> {
    require(&paths.dwi_to_flair)?;
    lesionkit_io::read_itk_affine(&paths.dwi_to_flair).map_err(|e| io_error(&paths.dwi_to_flair, e))
}

fn resample<B: Backend, T: lesionkit_core::transform::Transform<B, 3>>(
    image: &Image<B, 3>,
    transform: T,
    reference: &Frame,
) -> Image<B, 3> {
    ResampleImageFilter::new(*reference, transform, LinearInterpolator::new()).apply(image)
}

/// SyN result: an affine stage followed by a displacement field.
#[derive(Debug, Clone)]
pub struct SynTransform<B: Backend> {
    pub affine: AffineTransform,
    pub warp: DisplacementFieldTransform<B>,
}

impl<B: Backend> SynTransform<B> {
    pub fn new(affine: AffineTransform, warp: DisplacementFieldTransform<B>) -> Self {
        Self { affine, warp }
    }

    /// Identity SyN on `template`.
    pub fn identity(template: &Frame, device: &B::Device) -> Self {
        Self::new(
            AffineTransform::identity(),
            DisplacementFieldTransform::zeros(*template, device),
        )
    }

    pub fn read(paths: &TransformPaths, device: &B::Device) -> Result<Self> {
        require(&paths.flair_to_template_affine)?;
        require(&paths.flair_to_template_warp)?;
        let affine = lesionkit_io::read_itk_affine(&paths.flair_to_template_affine)
            .map_err(|e| io_error(&paths.flair_to_template_affine, e))?;
        let warp = lesionkit_io::read_displacement_field(&paths.flair_to_template_warp, device)
            .map_err(|e| io_error(&paths.flair_to_template_warp, e))?;
        debug!(size = ?warp.frame().size, "loaded SyN transform");
        Ok(Self::new(affine, warp))
    }

    pub fn write(&self, paths: &TransformPaths) -> Result<()> {
        lesionkit_io::write_itk_affine(&paths.flair_to_template_affine, &self.affine)
            .map_err(|e| io_error(&paths.flair_to_template_affine, e))?;
        lesionkit_io::write_displacement_field(&paths.flair_to_template_warp, &self.warp)
            .map_err(|e| io_error(&paths.flair_to_template_warp, e))
    }

    /// Template points → moving points in one map.
    pub fn point_map(&self) -> ChainedTransform<B, &DisplacementFieldTransform<B>, &AffineTransform, 3> {
        ChainedTransform::new(&self.warp, &self.affine)
    }

    /// Bring an intensity image onto `template`: affine first, then warp,
    /// each resampled onto the template grid.
    pub fn align_image(&self, image: &Image<B, 3>, template: &Frame) -> Image<B, 3> {
        let affine_only = resample(image, &self.affine, template);
        resample(&affine_only, &self.warp, template)
    }

    /// Label counterpart of [`Self::align_image`], rounding after each step.
    pub fn align_label(&self, label: &LabelImage<B>, template: &Frame) -> LabelImage<B> {
        let affine_only = transport_label(label, &self.affine, template);
        transport_label(&affine_only, &self.warp, template)
    }

    /// Inverse stages. Fails when the affine is singular.
    pub fn inverse(&self, strategy: InverseStrategy) -> Result<InverseSyn<B>> {
        let affine = self.affine.try_inverse().ok_or_else(|| {
            CoreError::NonInvertible(format!("SyN affine {:?}", self.affine.matrix()))
        })?;
        Ok(InverseSyn {
            warp: self.warp.invert(strategy),
            affine,
        })
    }
}

/// Template → native direction of a [`SynTransform`].
#[derive(Debug, Clone)]
pub struct InverseSyn<B: Backend> {
    pub warp: DisplacementFieldTransform<B>,
    pub affine: AffineTransform,
}

impl<B: Backend> InverseSyn<B> {
    /// Inverted warp on the image's own grid, then inverted affine onto
    /// `native`.
    pub fn apply_to_image(&self, image: &Image<B, 3>, native: &Frame) -> Image<B, 3> {
        let unwarped = resample(image, &self.warp, &image.frame());
        resample(&unwarped, &self.affine, native)
    }

    pub fn apply_to_label(&self, label: &LabelImage<B>, native: &Frame) -> LabelImage<B> {
        let unwarped = transport_label(label, &self.warp, &label.frame());
        transport_label(&unwarped, &self.affine, native)
    }
}

/// All transforms of one subject.
#[derive(Debug, Clone)]
pub struct TransformGraph<B: Backend> {
    pub dwi_to_flair: AffineTransform,
    pub flair_to_template: SynTransform<B>,
}

impl<B: Backend> TransformGraph<B> {
    pub fn load(paths: &TransformPaths, device: &B::Device) -> Result<Self> {
        Ok(Self {
            dwi_to_flair: read_dwi_to_flair(paths)?,
            flair_to_template: SynTransform::read(paths, device)?,
        })
    }

    pub fn save(&self, paths: &TransformPaths) -> Result<()> {
        lesionkit_io::write_itk_affine(&paths.dwi_to_flair, &self.dwi_to_flair)
            .map_err(|e| io_error(&paths.dwi_to_flair, e))?;
        self.flair_to_template.write(paths)
    }

    /// Template points → DWI points: warp, then the SyN affine composed
    /// with the rigid DWI stage.
    pub fn template_to_dwi(&self) -> ChainedTransform<B, &DisplacementFieldTransform<B>, AffineTransform, 3> {
        let affine = self.dwi_to_flair.compose(&self.flair_to_template.affine);
        ChainedTransform::new(&self.flair_to_template.warp, affine)
    }

    /// Carry a DWI-space label onto the FLAIR grid.
    pub fn dwi_label_to_flair(&self, label: &LabelImage<B>, flair: &Frame) -> LabelImage<B> {
        transport_label(label, &self.dwi_to_flair, flair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use lesionkit_core::spatial::{Direction, Point, Spacing};
    use nalgebra::{Matrix3, Vector3};

    type TestBackend = NdArray<f32>;

    fn frame(n: usize) -> Frame {
        Frame::lps([n, n, n], Point::origin(), Spacing::uniform(1.0), Direction::identity()).unwrap()
    }

    fn cube_label(n: usize, lo: usize, hi: usize) -> LabelImage<TestBackend> {
        let mut values = vec![0i64; n * n * n];
        for z in lo..hi {
            for y in lo..hi {
                for x in lo..hi {
                    values[(z * n + y) * n + x] = 1;
                }
            }
        }
        LabelImage::from_labels(values, &frame(n), &Default::default()).unwrap()
    }

    #[test]
    fn test_identity_syn_keeps_label() {
        let device = Default::default();
        let label = cube_label(8, 2, 6);
        let syn = SynTransform::<TestBackend>::identity(&frame(8), &device);
        let aligned = syn.align_label(&label, &frame(8));
        assert_eq!(aligned.values().unwrap(), label.values().unwrap());
    }

    #[test]
    fn test_translation_there_and_back() {
        let device = Default::default();
        let label = cube_label(12, 3, 7);
        let syn = SynTransform::new(
            AffineTransform::translation_only(Vector3::new(2.0, 0.0, -1.0)),
            DisplacementFieldTransform::<TestBackend>::zeros(frame(12), &device),
        );
        let aligned = syn.align_label(&label, &frame(12));
        assert_eq!(aligned.count_nonzero(), 64);

        let back = syn
            .inverse(InverseStrategy::Negate)
            .unwrap()
            .apply_to_label(&aligned, &frame(12));
        assert_eq!(back.values().unwrap(), label.values().unwrap());
    }

    #[test]
    fn test_singular_affine_has_no_inverse() {
        let device = Default::default();
        let syn = SynTransform::new(
            AffineTransform::new(Matrix3::zeros(), Vector3::zeros(), Point::origin()),
            DisplacementFieldTransform::<TestBackend>::zeros(frame(4), &device),
        );
        assert!(matches!(
            syn.inverse(InverseStrategy::Negate),
            Err(RegistrationError::Core(CoreError::NonInvertible(_)))
        ));
    }

    #[test]
    fn test_missing_files_are_reported() {
        let paths = TransformPaths::from_flair("/nonexistent/flair.nii.gz");
        let err = TransformGraph::<TestBackend>::load(&paths, &Default::default()).unwrap_err();
        assert!(matches!(err, RegistrationError::MissingTransform(p) if p == paths.dwi_to_flair));
    }
}
