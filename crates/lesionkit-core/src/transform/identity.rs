use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Transform;

/// Leaves points where they are. Resampling through it moves an image onto
/// another grid without changing its physical placement.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl<B: Backend, const D: usize> Transform<B, D> for IdentityTransform {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        points
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        Some(Box::new(IdentityTransform))
    }
}
