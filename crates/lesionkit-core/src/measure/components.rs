//! Connected-component labelling of 3D masks.
//!
//! Two-pass union-find: the first pass gives every foreground voxel the
//! smallest provisional label among its already-visited neighbours and
//! records equivalences, the second pass rewrites provisional labels to
//! consecutive ids in scan order.

use burn::tensor::backend::Backend;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::image::LabelImage;

/// Neighbourhood used to decide whether two voxels touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// Shared face.
    Faces6,
    /// Shared face or edge.
    Edges18,
    /// Any shared corner.
    #[default]
    Corners26,
}

impl Connectivity {
    /// Neighbour offsets `(dz, dy, dx)` that precede the voxel in scan order.
    fn backward_offsets(self) -> Vec<(isize, isize, isize)> {
        let mut offsets = Vec::new();
        for dz in -1isize..=0 {
            for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    if (dz, dy, dx) >= (0, 0, 0) {
                        continue;
                    }
                    let order = dz.abs() + dy.abs() + dx.abs();
                    let keep = match self {
                        Connectivity::Faces6 => order == 1,
                        Connectivity::Edges18 => order <= 2,
                        Connectivity::Corners26 => true,
                    };
                    if keep {
                        offsets.push((dz, dy, dx));
                    }
                }
            }
        }
        offsets
    }

    pub fn from_neighbours(n: usize) -> Option<Self> {
        match n {
            6 => Some(Self::Faces6),
            18 => Some(Self::Edges18),
            26 => Some(Self::Corners26),
            _ => None,
        }
    }
}

/// Result of [`connected_components`].
#[derive(Debug, Clone)]
pub struct Components<B: Backend> {
    /// Component id per voxel, 0 for background, `1..=sizes.len()` otherwise.
    pub labels: LabelImage<B>,
    /// Voxel count of component `i + 1`.
    pub sizes: Vec<usize>,
}

impl<B: Backend> Components<B> {
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

fn find_root(parents: &mut [usize], label: usize) -> usize {
    let mut current = label;
    while current != parents[current] {
        parents[current] = parents[parents[current]];
        current = parents[current];
    }
    current
}

fn union_labels(parents: &mut [usize], a: usize, b: usize) {
    let ra = find_root(parents, a);
    let rb = find_root(parents, b);
    if ra < rb {
        parents[rb] = ra;
    } else if rb < ra {
        parents[ra] = rb;
    }
}

/// Label the connected non-zero regions of `mask`.
pub fn connected_components<B: Backend>(
    mask: &LabelImage<B>,
    connectivity: Connectivity,
) -> Result<Components<B>> {
    let [nz, ny, nx] = mask.shape();
    let values = mask.values()?;
    let offsets = connectivity.backward_offsets();

    let mut labels = Array3::<usize>::zeros((nz, ny, nx));
    let mut parents = vec![0usize];

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if values[(z * ny + y) * nx + x] == 0 {
                    continue;
                }
                let mut smallest = 0usize;
                for &(dz, dy, dx) in &offsets {
                    let (zz, yy, xx) = (z as isize + dz, y as isize + dy, x as isize + dx);
                    if zz < 0 || yy < 0 || xx < 0 || yy >= ny as isize || xx >= nx as isize {
                        continue;
                    }
                    let neighbour = labels[[zz as usize, yy as usize, xx as usize]];
                    if neighbour == 0 {
                        continue;
                    }
                    if smallest == 0 {
                        smallest = neighbour;
                    } else if neighbour != smallest {
                        union_labels(&mut parents, smallest, neighbour);
                        smallest = smallest.min(neighbour);
                    }
                }
                if smallest == 0 {
                    smallest = parents.len();
                    parents.push(smallest);
                }
                labels[[z, y, x]] = smallest;
            }
        }
    }

    // Consecutive ids in order of first appearance of each root.
    let mut relabel = vec![0usize; parents.len()];
    let mut sizes = Vec::new();
    for provisional in 1..parents.len() {
        let root = find_root(&mut parents, provisional);
        if relabel[root] == 0 {
            sizes.push(0);
            relabel[root] = sizes.len();
        }
        relabel[provisional] = relabel[root];
    }

    let mut out = Vec::with_capacity(values.len());
    for &provisional in labels.iter() {
        let id = relabel[provisional];
        if id > 0 {
            sizes[id - 1] += 1;
        }
        out.push(id as i64);
    }

    let labels = LabelImage::from_labels(out, &mask.frame(), &mask.data().device())?;
    Ok(Components { labels, sizes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Frame;
    use crate::spatial::{Direction, Point, Spacing};

    type TestBackend = burn_ndarray::NdArray<f32>;

    fn mask(size: [usize; 3], voxels: &[[usize; 3]]) -> LabelImage<TestBackend> {
        let [nx, ny, nz] = size;
        let mut values = vec![0i64; nx * ny * nz];
        for &[x, y, z] in voxels {
            values[(z * ny + y) * nx + x] = 1;
        }
        let frame = Frame::lps(size, Point::origin(), Spacing::uniform(1.0), Direction::identity()).unwrap();
        LabelImage::from_labels(values, &frame, &Default::default()).unwrap()
    }

    #[test]
    fn test_offsets_count() {
        assert_eq!(Connectivity::Faces6.backward_offsets().len(), 3);
        assert_eq!(Connectivity::Edges18.backward_offsets().len(), 9);
        assert_eq!(Connectivity::Corners26.backward_offsets().len(), 13);
    }

    #[test]
    fn test_empty_mask() {
        let c = connected_components(&mask([3, 3, 3], &[]), Connectivity::Corners26).unwrap();
        assert!(c.is_empty());
        assert_eq!(c.labels.count_nonzero(), 0);
    }

    #[test]
    fn test_diagonal_depends_on_connectivity() {
        let voxels = [[0, 0, 0], [1, 1, 1]];
        let m = mask([3, 3, 3], &voxels);
        assert_eq!(connected_components(&m, Connectivity::Faces6).unwrap().sizes, vec![1, 1]);
        assert_eq!(connected_components(&m, Connectivity::Edges18).unwrap().sizes, vec![1, 1]);
        assert_eq!(connected_components(&m, Connectivity::Corners26).unwrap().sizes, vec![2]);

        let edge = mask([3, 3, 3], &[[0, 0, 0], [1, 1, 0]]);
        assert_eq!(connected_components(&edge, Connectivity::Faces6).unwrap().len(), 2);
        assert_eq!(connected_components(&edge, Connectivity::Edges18).unwrap().len(), 1);
    }

    #[test]
    fn test_u_shape_merges() {
        // Two arms joined at the bottom row: provisional labels 1 and 2 merge.
        let voxels = [[0, 0, 0], [2, 0, 0], [0, 1, 0], [2, 1, 0], [0, 2, 0], [1, 2, 0], [2, 2, 0]];
        let c = connected_components(&mask([3, 3, 1], &voxels), Connectivity::Faces6).unwrap();
        assert_eq!(c.sizes, vec![7]);
        let ids = c.labels.values().unwrap();
        assert!(ids.iter().all(|&id| id == 0 || id == 1));
    }

    #[test]
    fn test_separate_blobs_numbered_in_scan_order() {
        let voxels = [[0, 0, 0], [1, 0, 0], [3, 3, 3], [3, 3, 2], [3, 2, 3]];
        let c = connected_components(&mask([4, 4, 4], &voxels), Connectivity::Faces6).unwrap();
        assert_eq!(c.sizes, vec![2, 3]);
        let ids = c.labels.values().unwrap();
        assert_eq!(ids[0], 1);
        assert_eq!(ids[63], 2);
    }
}
