//! Crop → resample → pad, the canonical-grid recipe applied to every
//! subject before segmentation.

use burn_ndarray::NdArray;
use lesionkit_core::filter::{crop_to_mask, pad_to_shape, resample_to_spacing};
use lesionkit_core::spatial::{Direction, Point, Spacing};
use lesionkit_core::{CoreError, Frame, Image, LabelImage};

type Backend = NdArray<f32>;

fn subject(size: [usize; 3], spacing: [f64; 3], brain: ([usize; 3], [usize; 3])) -> (Image<Backend, 3>, LabelImage<Backend>) {
    let frame = Frame::lps(size, Point::new([-40.0, 30.0, -10.0]), Spacing::new(spacing), Direction::identity())
        .unwrap();
    let [nx, ny, nz] = size;
    let (lo, hi) = brain;
    let mut intensity = Vec::with_capacity(frame.num_voxels());
    let mut mask = Vec::with_capacity(frame.num_voxels());
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let inside = (lo[0]..=hi[0]).contains(&x) && (lo[1]..=hi[1]).contains(&y) && (lo[2]..=hi[2]).contains(&z);
                intensity.push(if inside { 100.0 + x as f32 } else { 0.0 });
                mask.push(inside as i64);
            }
        }
    }
    let device = Default::default();
    (
        Image::from_values(intensity, &frame, &device).unwrap(),
        LabelImage::from_labels(mask, &frame, &device).unwrap(),
    )
}

#[test]
fn test_canonical_grid_postcondition() {
    let (flair, mask) = subject([40, 36, 12], [0.9, 0.9, 4.0], ([5, 4, 1], [34, 30, 10]));
    let target_shape = [32, 32, 48];
    let target_spacing = Spacing::uniform(1.0);

    let cropped = crop_to_mask(&flair, &mask).unwrap();
    assert_eq!(cropped.size(), [30, 27, 10]);

    let resampled = resample_to_spacing(&cropped, target_spacing).unwrap();
    assert_eq!(resampled.size(), [27, 24, 40]);

    let padded = pad_to_shape(&resampled, target_shape).unwrap();
    assert_eq!(padded.size(), target_shape);
    assert_eq!(*padded.spacing(), target_spacing);

    // Padding splits 5 voxels as 2 below / 3 above along x.
    let expected_origin = resampled.frame().index_to_physical([-2.0, -4.0, -4.0]);
    assert_eq!(*padded.origin(), expected_origin);
}

#[test]
fn test_canonical_grid_overflow_is_explicit() {
    let (flair, mask) = subject([40, 36, 12], [1.0, 1.0, 1.0], ([0, 0, 0], [39, 35, 11]));
    let cropped = crop_to_mask(&flair, &mask).unwrap();
    let resampled = resample_to_spacing(&cropped, Spacing::uniform(1.0)).unwrap();

    match pad_to_shape(&resampled, [32, 48, 48]) {
        Err(CoreError::GridOverflow { axis, size, target }) => {
            assert_eq!(axis, 0);
            assert_eq!(size, [40, 36, 12]);
            assert_eq!(target, [32, 48, 48]);
        }
        other => panic!("expected overflow, got {other:?}"),
    }
}

#[test]
fn test_crop_with_empty_mask_fails() {
    let (flair, _) = subject([8, 8, 8], [1.0, 1.0, 1.0], ([0, 0, 0], [7, 7, 7]));
    let empty = LabelImage::<Backend>::from_labels(vec![0; 512], &flair.frame(), &Default::default()).unwrap();
    assert!(matches!(crop_to_mask(&flair, &empty), Err(CoreError::EmptyMask(_))));
}
