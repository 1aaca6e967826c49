//! Synthetic subjects on disk.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use burn_ndarray::NdArray;
use lesionkit_core::image::{Frame, Image, LabelImage};
use lesionkit_core::spatial::{Direction, Point, Spacing};
use lesionkit_core::transform::AffineTransform;
use lesionkit_pipeline::{LabelSource, Modality, SubjectSpec};
use lesionkit_registration::{SynTransform, TransformPaths};
use nalgebra::Vector3;

pub type TestBackend = NdArray<f32>;

pub const SIZE: [usize; 3] = [12, 12, 10];
/// Voxels of the synthetic lesion cube.
pub const LESION_VOXELS: usize = 27;

pub fn frame() -> Frame {
    Frame::lps(
        SIZE,
        Point::new([-9.0, -9.0, -10.0]),
        Spacing::new([1.5, 1.5, 2.0]),
        Direction::identity(),
    )
    .unwrap()
}

pub fn voxel_ml() -> f64 {
    1.5 * 1.5 * 2.0 / 1000.0
}

pub fn in_brain(x: usize, y: usize, z: usize) -> bool {
    (2..=9).contains(&x) && (2..=9).contains(&y) && (2..=7).contains(&z)
}

pub fn in_lesion(x: usize, y: usize, z: usize) -> bool {
    (4..=6).contains(&x) && (4..=6).contains(&y) && (3..=5).contains(&z)
}

pub fn fill<T>(f: impl Fn(usize, usize, usize) -> T) -> Vec<T> {
    let [nx, ny, nz] = SIZE;
    let mut values = Vec::with_capacity(nx * ny * nz);
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                values.push(f(x, y, z));
            }
        }
    }
    values
}

pub fn flair_values() -> Vec<f32> {
    fill(|x, y, z| {
        if in_brain(x, y, z) {
            100.0 + x as f32 + 2.0 * y as f32 + 3.0 * z as f32
        } else {
            0.0
        }
    })
}

pub fn dwi_values() -> Vec<f32> {
    fill(|x, y, z| 20.0 + 5.0 * y as f32 + x as f32 + if in_lesion(x, y, z) { 40.0 } else { 0.0 })
}

pub fn lesion_values(lesion: bool) -> Vec<i64> {
    fill(|x, y, z| (lesion && in_lesion(x, y, z)) as i64)
}

pub struct SubjectFiles {
    pub spec: SubjectSpec,
    pub transforms: TransformPaths,
}

/// Write a subject with identity transforms under `root/name`.
pub fn write_subject(root: &Path, name: &str, lesion: bool) -> SubjectFiles {
    let device = Default::default();
    let frame = frame();
    let dir = root.join(name);
    let flair = dir.join("anat").join(format!("{name}_FLAIR.nii.gz"));
    let dwi = dir.join("dwi").join(format!("{name}_dwi.nii.gz"));
    let label = dir.join("derivatives").join(format!("{name}_msk.nii.gz"));

    let flair_image = Image::<TestBackend, 3>::from_values(flair_values(), &frame, &device).unwrap();
    let dwi_image = Image::<TestBackend, 3>::from_values(dwi_values(), &frame, &device).unwrap();
    let label_image = LabelImage::<TestBackend>::from_labels(lesion_values(lesion), &frame, &device).unwrap();
    lesionkit_io::write_nifti(&flair, &flair_image).unwrap();
    lesionkit_io::write_nifti(&dwi, &dwi_image).unwrap();
    lesionkit_io::write_label(&label, &label_image).unwrap();

    let transforms = TransformPaths::from_flair(&flair);
    write_identity_transforms(&transforms, &frame);

    SubjectFiles {
        spec: SubjectSpec {
            name: name.to_string(),
            flair,
            dwi,
            label,
            bet_mask: None,
            label_source: LabelSource::Volume { modality: Modality::Dwi },
            allow_empty_label: false,
        },
        transforms,
    }
}

pub fn write_identity_transforms(paths: &TransformPaths, template: &Frame) {
    lesionkit_io::write_itk_affine(&paths.dwi_to_flair, &AffineTransform::identity()).unwrap();
    SynTransform::<TestBackend>::identity(template, &Default::default())
        .write(paths)
        .unwrap();
}

/// Translate the DWI → FLAIR transform by `voxels` along x.
pub fn shift_dwi(paths: &TransformPaths, voxels: usize) {
    let shift = AffineTransform::translation_only(Vector3::new(1.5 * voxels as f64, 0.0, 0.0));
    lesionkit_io::write_itk_affine(&paths.dwi_to_flair, &shift).unwrap();
}

/// FLAIR segment: the lesion cube without its x = 6 slab.
pub fn in_flair_segment(x: usize, y: usize, z: usize) -> bool {
    in_lesion(x, y, z) && x < 6
}

/// DWI segment: the x = 6 slab, drawn `shift` voxels further along x.
pub fn in_dwi_segment(x: usize, y: usize, z: usize, shift: usize) -> bool {
    x >= shift && in_lesion(x - shift, y, z) && x - shift == 6
}

/// Write a two-segment Slicer NRRD on a grid one voxel larger than the
/// FLAIR grid on every side.
pub fn write_dual_annotation(root: &Path, dwi_shift: usize) -> PathBuf {
    let path = root.join(format!("case_shift{dwi_shift}.seg.nrrd"));
    let [nx, ny, nz] = SIZE.map(|n| n + 2);
    let header = format!(
        "NRRD0004\ntype: unsigned char\ndimension: 4\nspace: left-posterior-superior\n\
         sizes: 2 {nx} {ny} {nz}\nspace directions: none (1.5,0,0) (0,1.5,0) (0,0,2)\n\
         kinds: list domain domain domain\nencoding: raw\nspace origin: (-10.5,-10.5,-12)\n\
         Segment0_ID:=Segment_1\nSegment0_Name:=Lesion FLAIR\nSegment0_Layer:=0\nSegment0_LabelValue:=1\n\
         Segment1_ID:=Segment_2\nSegment1_Name:=lesion dwi\nSegment1_Layer:=1\nSegment1_LabelValue:=1\n\n"
    );
    let mut bytes = header.into_bytes();
    for c in 0..nz {
        for b in 0..ny {
            for a in 0..nx {
                // Annotation voxel (a, b, c) sits on FLAIR voxel (a - 1, b - 1, c - 1).
                let inside = a > 0 && b > 0 && c > 0;
                let (x, y, z) = (a.saturating_sub(1), b.saturating_sub(1), c.saturating_sub(1));
                bytes.push((inside && in_flair_segment(x, y, z)) as u8);
                bytes.push((inside && in_dwi_segment(x, y, z, dwi_shift)) as u8);
            }
        }
    }
    std::fs::write(&path, bytes).unwrap();
    path
}
