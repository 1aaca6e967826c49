//! NIfTI-1 volumes.
//!
//! NIfTI stores a voxel-to-RAS affine; images are converted to LPS on read
//! and back on write. The array handed out by the `nifti` crate is indexed
//! `[x, y, z]`, tensors are `[z, y, x]`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use lesionkit_core::image::{CoordinateConvention, Frame, Image, LabelImage};
use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion};
use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use tracing::debug;

fn sform_affine(header: &NiftiHeader) -> Matrix4<f64> {
    let mut affine = Matrix4::identity();
    for (r, row) in [header.srow_x, header.srow_y, header.srow_z].iter().enumerate() {
        for c in 0..4 {
            affine[(r, c)] = row[c] as f64;
        }
    }
    affine
}

fn qform_affine(header: &NiftiHeader) -> Matrix4<f64> {
    let b = header.quatern_b as f64;
    let c = header.quatern_c as f64;
    let d = header.quatern_d as f64;
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

    let rotation = Matrix3::new(
        a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c),
        2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b),
        2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - b * b - c * c,
    );
    let scale = [
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64 * qfac,
    ];

    let mut affine = Matrix4::identity();
    for r in 0..3 {
        for col in 0..3 {
            affine[(r, col)] = rotation[(r, col)] * scale[col];
        }
    }
    affine[(0, 3)] = header.quatern_x as f64;
    affine[(1, 3)] = header.quatern_y as f64;
    affine[(2, 3)] = header.quatern_z as f64;
    affine
}

fn pixdim_affine(header: &NiftiHeader) -> Matrix4<f64> {
    let mut affine = Matrix4::identity();
    for axis in 0..3 {
        affine[(axis, axis)] = header.pixdim[axis + 1] as f64;
    }
    affine
}

/// Grid of a header in LPS.
///
/// The sform wins when it is set and describes an orthonormal grid; a
/// sheared sform falls back to the qform, as ITK does.
pub(crate) fn header_frame(header: &NiftiHeader) -> Result<Frame> {
    let size = [header.dim[1] as usize, header.dim[2] as usize, header.dim[3] as usize];
    let ras = |affine: Matrix4<f64>| Frame::from_affine(size, &affine, CoordinateConvention::Ras);

    let frame = if header.sform_code > 0 {
        match ras(sform_affine(header)) {
            Ok(frame) => frame,
            Err(e) if header.qform_code > 0 => {
                debug!(error = %e, "sform rejected, using qform");
                ras(qform_affine(header)).context("NIfTI qform is invalid")?
            }
            Err(e) => return Err(e).context("NIfTI sform is invalid"),
        }
    } else if header.qform_code > 0 {
        ras(qform_affine(header)).context("NIfTI qform is invalid")?
    } else {
        ras(pixdim_affine(header)).context("NIfTI pixdim is invalid")?
    };
    Ok(frame.to_convention(CoordinateConvention::Lps))
}

/// Header carrying the geometry of `frame` in both sform and qform.
pub(crate) fn header_for_frame(frame: &Frame) -> NiftiHeader {
    let ras = frame.to_convention(CoordinateConvention::Ras);
    let affine = ras.to_affine();

    let mut header = NiftiHeader::default();
    header.sform_code = 1;
    header.qform_code = 1;
    header.xyzt_units = 2;
    header.srow_x = row(&affine, 0);
    header.srow_y = row(&affine, 1);
    header.srow_z = row(&affine, 2);

    // Improper rotations are stored with qfac = -1 and a flipped third axis.
    let mut rotation = ras.direction.0;
    let qfac = if rotation.determinant() < 0.0 {
        for r in 0..3 {
            rotation[(r, 2)] = -rotation[(r, 2)];
        }
        -1.0
    } else {
        1.0
    };
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
    header.quatern_b = (sign * q.i) as f32;
    header.quatern_c = (sign * q.j) as f32;
    header.quatern_d = (sign * q.k) as f32;
    header.quatern_x = affine[(0, 3)] as f32;
    header.quatern_y = affine[(1, 3)] as f32;
    header.quatern_z = affine[(2, 3)] as f32;

    header.pixdim = [
        qfac as f32,
        ras.spacing[0] as f32,
        ras.spacing[1] as f32,
        ras.spacing[2] as f32,
        1.0,
        1.0,
        1.0,
        1.0,
    ];
    header
}

fn row(affine: &Matrix4<f64>, r: usize) -> [f32; 4] {
    [
        affine[(r, 0)] as f32,
        affine[(r, 1)] as f32,
        affine[(r, 2)] as f32,
        affine[(r, 3)] as f32,
    ]
}

/// Drop trailing singleton axes (`[x, y, z, 1]` → `[x, y, z]`).
fn squeeze_to_3d(mut array: ArrayD<f32>) -> Result<Array3<f32>> {
    while array.ndim() > 3 && array.shape()[array.ndim() - 1] == 1 {
        let last = array.ndim() - 1;
        array = array.index_axis_move(Axis(last), 0);
    }
    let ndim = array.ndim();
    array
        .into_dimensionality::<Ix3>()
        .with_context(|| format!("Expected a 3D NIfTI volume, found {ndim} dimensions"))
}

fn read_volume(path: &Path) -> Result<(Frame, Vec<f32>)> {
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let frame = header_frame(obj.header())?;
    let volume = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let volume = squeeze_to_3d(volume)?;

    let [nx, ny, nz] = frame.size;
    if volume.shape() != [nx, ny, nz] {
        bail!("Header size {:?} disagrees with data shape {:?}", frame.size, volume.shape());
    }
    // [x, y, z] → memory order z, y, x
    let values = volume.permuted_axes([2, 1, 0]).iter().copied().collect();
    debug!(path = %path.display(), size = ?frame.size, "read nifti");
    Ok((frame, values))
}

/// Grid of a NIfTI file without reading its voxels.
pub fn read_nifti_frame<P: AsRef<Path>>(path: P) -> Result<Frame> {
    let path = path.as_ref();
    let header = NiftiHeader::from_file(path)
        .with_context(|| format!("Failed to read NIfTI header {}", path.display()))?;
    header_frame(&header)
}

/// Read an intensity volume.
pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<Image<B, 3>> {
    let (frame, values) = read_volume(path.as_ref())?;
    Ok(Image::from_values(values, &frame, device)?)
}

/// Read a label volume; voxels are rounded to the nearest class id.
pub fn read_label<B: Backend, P: AsRef<Path>>(path: P, device: &B::Device) -> Result<LabelImage<B>> {
    let path = path.as_ref();
    let (frame, values) = read_volume(path)?;
    let labels = values
        .into_iter()
        .map(|v| v.round() as i64)
        .collect::<Vec<_>>();
    if labels.iter().any(|&v| v < 0) {
        bail!("Label volume {} has negative class ids", path.display());
    }
    Ok(LabelImage::from_labels(labels, &frame, device)?)
}

fn prepare(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    Ok(())
}

fn to_nifti_order<T>(values: Vec<T>, frame: &Frame) -> Result<Array3<T>> {
    let [nx, ny, nz] = frame.size;
    let array = Array3::from_shape_vec((nz, ny, nx), values).context("Voxel count does not match grid")?;
    Ok(array.permuted_axes([2, 1, 0]))
}

/// Write an intensity volume as `f32`.
pub fn write_nifti<B: Backend, P: AsRef<Path>>(path: P, image: &Image<B, 3>) -> Result<()> {
    let path = path.as_ref();
    prepare(path)?;
    let frame = image.frame();
    let header = header_for_frame(&frame);
    let array = to_nifti_order(image.values()?, &frame)?;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))
}

/// Write a label volume as unsigned 32-bit class ids.
pub fn write_label<B: Backend, P: AsRef<Path>>(path: P, label: &LabelImage<B>) -> Result<()> {
    let path = path.as_ref();
    prepare(path)?;
    let frame = label.frame();
    let header = header_for_frame(&frame);
    let values = label
        .values()?
        .into_iter()
        .map(|v| u32::try_from(v).context("Class id does not fit in u32"))
        .collect::<Result<Vec<_>>>()?;
    let array = to_nifti_order(values, &frame)?;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))
}

/// Write a binary mask as `u8` (non-zero → 1).
pub fn write_mask_u8<B: Backend, P: AsRef<Path>>(path: P, mask: &LabelImage<B>) -> Result<()> {
    let path = path.as_ref();
    prepare(path)?;
    let frame = mask.frame();
    let header = header_for_frame(&frame);
    let values = mask.values()?.into_iter().map(|v| (v != 0) as u8).collect();
    let array = to_nifti_order(values, &frame)?;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))
}
