//! Class probabilities exported by nnU-Net (`.npz` + geometry sidecar).
//!
//! The archive holds `probabilities` with shape `[classes, z, y, x]`, the
//! SimpleITK array order. Geometry is not part of the archive; it comes from
//! a JSON sidecar with the SimpleITK `spacing`, `origin` and row-major
//! `direction` of the source image, all in LPS.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use burn::tensor::backend::Backend;
use lesionkit_core::image::{CoordinateConvention, Frame, Image};
use lesionkit_core::spatial::{Direction, Point, Spacing};
use nalgebra::Matrix3;
use ndarray::{Array4, Axis};
use ndarray_npy::NpzReader;
use serde::{Deserialize, Serialize};

const PROBABILITIES: &str = "probabilities";

/// SimpleITK image geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitkGeometry {
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    /// Row-major 3×3 direction cosines.
    pub direction: [f64; 9],
}

impl SitkGeometry {
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        serde_json::from_reader(file).with_context(|| format!("Failed to parse geometry {}", path.display()))
    }

    pub fn from_frame(frame: &Frame) -> Self {
        let lps = frame.to_convention(CoordinateConvention::Lps);
        let mut direction = [0.0; 9];
        for r in 0..3 {
            for c in 0..3 {
                direction[r * 3 + c] = lps.direction[(r, c)];
            }
        }
        Self {
            spacing: lps.spacing.to_array(),
            origin: lps.origin.to_array(),
            direction,
        }
    }

    /// Grid of `size` (`[nx, ny, nz]`) with this geometry.
    pub fn frame(&self, size: [usize; 3]) -> Result<Frame> {
        let d = &self.direction;
        let direction = Direction(Matrix3::new(d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7], d[8]));
        Ok(Frame::lps(size, Point::new(self.origin), Spacing::new(self.spacing), direction)?)
    }
}

fn read_probabilities(path: &Path) -> Result<Array4<f32>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut npz = NpzReader::new(file).with_context(|| format!("Not an npz archive: {}", path.display()))?;
    let names = npz.names()?;
    let name = names
        .iter()
        .find(|n| n.as_str() == PROBABILITIES || n.trim_end_matches(".npy") == PROBABILITIES)
        .cloned()
        .with_context(|| format!("{} has no '{PROBABILITIES}' array", path.display()))?;

    match npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix4>(&name) {
        Ok(array) => Ok(array),
        Err(_) => {
            let array: Array4<f64> = npz
                .by_name(&name)
                .with_context(|| format!("'{name}' in {} is not a 4D float array", path.display()))?;
            Ok(array.mapv(|v| v as f32))
        }
    }
}

/// Probability map of `class` from an nnU-Net archive.
pub fn read_probability_npz<B: Backend, P: AsRef<Path>>(
    path: P,
    geometry: &SitkGeometry,
    class: usize,
    device: &B::Device,
) -> Result<Image<B, 3>> {
    let path = path.as_ref();
    let probabilities = read_probabilities(path)?;
    let [classes, nz, ny, nx] = [
        probabilities.shape()[0],
        probabilities.shape()[1],
        probabilities.shape()[2],
        probabilities.shape()[3],
    ];
    if class >= classes {
        bail!("{} has {classes} classes, class {class} requested", path.display());
    }
    let channel = probabilities.index_axis(Axis(0), class);
    let values: Vec<f32> = channel.iter().copied().collect();
    ensure!(values.len() == nx * ny * nz, "Probability channel has the wrong size");

    let frame = geometry.frame([nx, ny, nz])?;
    Ok(Image::from_values(values, &frame, device)?)
}
