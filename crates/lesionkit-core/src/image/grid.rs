use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

/// Continuous indices of every voxel of a grid of `size = [nx, ny, nz]`.
///
/// Rows follow tensor memory order (`z` slowest, `x` fastest) so the result
/// of sampling can be reshaped straight to `[nz, ny, nx]`. Columns are the
/// `(x, y, z)` index components.
pub fn index_grid<B: Backend>(size: [usize; 3], device: &B::Device) -> Tensor<B, 2> {
    let [w, h, d] = size;
    let n = d * h * w;

    let z_range = Tensor::<B, 1, Int>::arange(0..d as i64, device);
    let y_range = Tensor::<B, 1, Int>::arange(0..h as i64, device);
    let x_range = Tensor::<B, 1, Int>::arange(0..w as i64, device);

    let z_grid = z_range.reshape([d, 1, 1]).repeat(&[1, h, w]).reshape([n]).float();
    let y_grid = y_range.reshape([1, h, 1]).repeat(&[d, 1, w]).reshape([n]).float();
    let x_grid = x_range.reshape([1, 1, w]).repeat(&[d, h, 1]).reshape([n]).float();

    Tensor::cat(
        vec![
            x_grid.unsqueeze_dim(1),
            y_grid.unsqueeze_dim(1),
            z_grid.unsqueeze_dim(1),
        ],
        1,
    )
}
