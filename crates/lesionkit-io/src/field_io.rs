//! Displacement fields in the ITK/ANTs NIfTI layout.
//!
//! The file is a 5D volume `[nx, ny, nz, 1, 3]` with intent
//! `NIFTI_INTENT_DISPVECT`. The grid affine is RAS like any NIfTI, but the
//! vectors themselves are LPS millimetres and are kept as they are.

use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use lesionkit_core::transform::DisplacementFieldTransform;
use ndarray::{Array, Axis, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use tracing::debug;

use crate::nifti_io::{header_for_frame, header_frame};

const NIFTI_INTENT_DISPVECT: i16 = 1006;

/// Read a displacement field transform.
pub fn read_displacement_field<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> Result<DisplacementFieldTransform<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read displacement field {}", path.display()))?;
    let frame = header_frame(obj.header())?;
    let mut array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert displacement field to ndarray")?;

    if array.ndim() == 5 && array.shape()[3] == 1 {
        array = array.index_axis_move(Axis(3), 0);
    }
    let [nx, ny, nz] = frame.size;
    if array.shape() != [nx, ny, nz, 3] {
        bail!(
            "Displacement field {} has shape {:?}, expected [{nx}, {ny}, {nz}, (1,) 3]",
            path.display(),
            array.shape()
        );
    }

    // [x, y, z, c] → memory order c, z, y, x
    let values: Vec<f32> = array
        .permuted_axes(IxDyn(&[3, 2, 1, 0]))
        .iter()
        .copied()
        .collect();
    let field = Tensor::<B, 4>::from_data(
        TensorData::new(values, [3, nz, ny, nx]).convert::<B::FloatElem>(),
        device,
    );
    debug!(path = %path.display(), size = ?frame.size, "read displacement field");
    Ok(DisplacementFieldTransform::new(field, frame)?)
}

/// Write a displacement field transform.
pub fn write_displacement_field<B: Backend, P: AsRef<Path>>(
    path: P,
    transform: &DisplacementFieldTransform<B>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let frame = transform.frame();
    let [nx, ny, nz] = frame.size;
    let values = transform
        .field()
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to read field tensor: {e:?}"))?;

    let array = Array::from_shape_vec(IxDyn(&[3, 1, nz, ny, nx]), values)
        .context("Field size does not match its grid")?
        .permuted_axes(IxDyn(&[4, 3, 2, 1, 0]));

    let mut header = header_for_frame(frame);
    header.intent_code = NIFTI_INTENT_DISPVECT;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write displacement field {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use lesionkit_core::image::Frame;
    use lesionkit_core::spatial::{Direction, Point, Spacing};
    use lesionkit_core::transform::Transform;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_field_round_trip_keeps_lps_vectors() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("warp.nii.gz");
        let device = Default::default();
        let frame = Frame::lps([4, 3, 2], Point::new([-2.0, 5.0, 1.0]), Spacing::uniform(2.0), Direction::identity())?;

        let values: Vec<f32> = (0..72).map(|v| v as f32 / 10.0).collect();
        let field = Tensor::<TestBackend, 4>::from_data(TensorData::new(values.clone(), [3, 2, 3, 4]), &device);
        let transform = DisplacementFieldTransform::new(field, frame)?;

        write_displacement_field(&path, &transform)?;
        let back = read_displacement_field::<TestBackend, _>(&path, &device)?;

        assert!(back.frame().same_grid(&frame));
        let read = back.field().clone().into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert_eq!(read, values);

        // Voxel (1, 0, 0) sits at x = 0; its x displacement is value 1 → 0.1.
        let p = Tensor::<TestBackend, 2>::from_floats([[0.0, 5.0, 1.0]], &device);
        let moved = back.transform_points(p).into_data().convert::<f32>().to_vec::<f32>().unwrap();
        assert!((moved[0] - 0.1).abs() < 1e-6);
        Ok(())
    }
}
