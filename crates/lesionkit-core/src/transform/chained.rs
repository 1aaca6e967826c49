//! Chained transform implementation.
//!
//! T(x) = T2(T1(x))

use std::marker::PhantomData;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Transform;

/// Applies `first`, then `second`, to every point.
///
/// For a SyN result read back from disk the point map from template space
/// to native space is `Chained(warp, affine)`: the displacement field acts
/// in template space, the affine carries the result into the moving image.
#[derive(Debug, Clone)]
pub struct ChainedTransform<B: Backend, T1, T2, const D: usize> {
    pub first: T1,
    pub second: T2,
    _phantom: PhantomData<B>,
}

impl<B: Backend, T1, T2, const D: usize> ChainedTransform<B, T1, T2, D> {
    pub fn new(first: T1, second: T2) -> Self {
        Self {
            first,
            second,
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend, T1, T2, const D: usize> Transform<B, D> for ChainedTransform<B, T1, T2, D>
where
    T1: Transform<B, D>,
    T2: Transform<B, D>,
{
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let intermediate = self.first.transform_points(points);
        self.second.transform_points(intermediate)
    }

    /// (T2 ∘ T1)⁻¹ = T1⁻¹ ∘ T2⁻¹
    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        let second_inv = self.second.inverse()?;
        let first_inv = self.first.inverse()?;
        Some(Box::new(ChainedTransform::<B, _, _, D>::new(second_inv, first_inv)))
    }
}
