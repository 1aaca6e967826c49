use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use lesionkit_core::spatial::{Direction, Point, Spacing};
use lesionkit_core::transform::{
    AffineTransform, ChainedTransform, DisplacementFieldTransform, InverseStrategy, Transform,
};
use lesionkit_core::Frame;
use nalgebra::{Matrix3, Vector3};

type B = NdArray<f32>;

fn to_vec(t: Tensor<B, 2>) -> Vec<f32> {
    t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
}

fn field_frame() -> Frame {
    Frame::lps([21, 21, 21], Point::new([-10.0, -10.0, -10.0]), Spacing::uniform(1.0), Direction::identity())
        .unwrap()
}

/// Smooth field `u(p) = a * sin(p_x / 4) * e_x` on a 21³ grid.
fn smooth_field(amplitude: f32) -> DisplacementFieldTransform<B> {
    let frame = field_frame();
    let n = 21;
    let mut values = vec![0.0f32; 3 * n * n * n];
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let px = x as f32 - 10.0;
                values[(z * n + y) * n + x] = amplitude * (px / 4.0).sin();
            }
        }
    }
    let field = Tensor::from_data(TensorData::new(values, [3, n, n, n]), &Default::default());
    DisplacementFieldTransform::new(field, frame).unwrap()
}

#[test]
fn test_syn_point_map_applies_warp_then_affine() {
    let device = Default::default();
    let warp = smooth_field(1.0);
    let affine = AffineTransform::translation_only(Vector3::new(5.0, 0.0, 0.0));
    let chained = ChainedTransform::<B, _, _, 3>::new(warp.clone(), affine);

    let p = Tensor::<B, 2>::from_floats([[2.0, 1.0, 0.0]], &device);
    let out = to_vec(chained.transform_points(p));
    let expected = 2.0 + (2.0f32 / 4.0).sin() + 5.0;
    assert!((out[0] - expected).abs() < 1e-4, "{} vs {}", out[0], expected);
    assert!((out[1] - 1.0).abs() < 1e-6);
}

#[test]
fn test_chained_affine_inverse_round_trip() {
    let device = Default::default();
    let angle: f64 = 0.25;
    let rotation = Matrix3::new(
        angle.cos(), 0.0, angle.sin(),
        0.0, 1.0, 0.0,
        -angle.sin(), 0.0, angle.cos(),
    );
    let rigid = AffineTransform::new(rotation, Vector3::new(2.0, -1.0, 3.0), Point::new([1.0, 2.0, 3.0]));
    let scale = AffineTransform::new(Matrix3::identity() * 1.2, Vector3::zeros(), Point::origin());
    let chained = ChainedTransform::<B, _, _, 3>::new(rigid, scale);
    let inverse = chained.inverse().unwrap();

    let points = Tensor::<B, 2>::from_floats([[10.0, -4.0, 7.0], [0.0, 0.0, 0.0]], &device);
    let back = to_vec(inverse.transform_points(chained.transform_points(points.clone())));
    for (a, b) in back.iter().zip(to_vec(points)) {
        assert!((a - b).abs() < 1e-4);
    }
}

#[test]
fn test_fixed_point_inverse_composes_to_identity() {
    let device = Default::default();
    let forward = smooth_field(1.5);
    let inverse = forward.invert(InverseStrategy::FixedPoint { iterations: 15 });
    let negated = forward.invert(InverseStrategy::Negate);

    // Interior points, away from the zero padding outside the field grid.
    let points = Tensor::<B, 2>::from_floats(
        [[0.0, 3.0, 0.0], [2.0, -5.0, 1.0], [-3.0, 6.0, -2.0]],
        &device,
    );
    let original = to_vec(points.clone());

    // x -> x + v(x) -> y + u(y) should return to x.
    let fixed = to_vec(forward.transform_points(inverse.transform_points(points.clone())));
    let naive = to_vec(forward.transform_points(negated.transform_points(points)));

    let err = |v: &[f32]| v.iter().zip(&original).map(|(a, b)| (a - b).abs()).fold(0.0f32, f32::max);
    assert!(err(&fixed) < 0.05, "fixed-point error {}", err(&fixed));
    assert!(err(&fixed) <= err(&naive));
}
