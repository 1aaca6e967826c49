//! Transform trait for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Maps physical points of one space to another.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `D` - The spatial dimensionality
pub trait Transform<B: Backend, const D: usize> {
    /// Apply the transform to a batch of points `[N, D]`.
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;

    /// The inverse transform, if one exists in closed form.
    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        None
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for Box<dyn Transform<B, D>> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.as_ref().transform_points(points)
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        self.as_ref().inverse()
    }
}

impl<B: Backend, const D: usize, T: Transform<B, D> + ?Sized> Transform<B, D> for &T {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        (**self).transform_points(points)
    }

    fn inverse(&self) -> Option<Box<dyn Transform<B, D>>> {
        (**self).inverse()
    }
}
