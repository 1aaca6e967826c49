//! Mutual information metrics.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use lesionkit_core::image::Image;
use lesionkit_core::transform::Transform;
use lesionkit_core::CoreError;

use super::histogram::{normalise, JointHistogram};
use super::trait_::{sample_overlap, Metric};
use crate::error::{RegistrationError, Result};

const CHUNK_SIZE: usize = 32768;

/// Mutual Information Metric using Parzen Window estimation.
///
/// Computes the mutual information between two images:
/// MI(A, B) = H(A) + H(B) - H(A, B)
/// where H is the Shannon entropy in nats.
///
/// Intensities are mapped to `[0, 1]` per image, bins are evenly spaced in
/// that range and every sample spreads a Gaussian of width `sigma` over them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutualInformation {
    num_bins: usize,
    sigma: f64,
}

impl MutualInformation {
    /// # Arguments
    /// * `num_bins` - Number of histogram bins (default: 32)
    /// * `sigma` - Parzen kernel width in normalised intensity (default: 0.02)
    pub fn new(num_bins: usize, sigma: f64) -> Self {
        Self { num_bins, sigma }
    }

    fn kernel<B: Backend>(values: &[f32], bins: Tensor<B, 2>, sigma: f64, device: &B::Device) -> Tensor<B, 2> {
        let n = values.len();
        let values = Tensor::<B, 1>::from_data(
            TensorData::new(values.to_vec(), [n]).convert::<B::FloatElem>(),
            device,
        )
        .reshape([n, 1]);
        let diff = values - bins;
        (diff.powf_scalar(2.0) * (-0.5 / (sigma * sigma))).exp()
    }

    /// Parzen joint histogram of paired samples.
    pub fn joint_histogram<B: Backend>(
        &self,
        fixed: &[f32],
        moving: &[f32],
        device: &B::Device,
    ) -> Result<JointHistogram> {
        if self.num_bins < 2 {
            return Err(RegistrationError::invalid_configuration("at least two bins are required"));
        }
        let nb = self.num_bins;
        let fixed = normalise(fixed);
        let moving = normalise(moving);

        // Bin centres [1, nb]
        let centres: Vec<f32> = (0..nb).map(|k| k as f32 / (nb - 1) as f32).collect();
        let bins = Tensor::<B, 1>::from_data(TensorData::new(centres, [nb]).convert::<B::FloatElem>(), device)
            .reshape([1, nb]);

        let mut histogram = JointHistogram::new(nb, nb);
        for (f, m) in fixed.chunks(CHUNK_SIZE).zip(moving.chunks(CHUNK_SIZE)) {
            let weights_f = Self::kernel(f, bins.clone(), self.sigma, device);
            let weights_m = Self::kernel(m, bins.clone(), self.sigma, device);
            // Entry (i, j) is sum_k w_f(k, i) * w_m(k, j)
            let block = weights_f.transpose().matmul(weights_m);
            let block = block
                .into_data()
                .convert::<f32>()
                .to_vec::<f32>()
                .map_err(|e| RegistrationError::Core(CoreError::data(format!("{e:?}"))))?;
            histogram.accumulate(&block);
        }
        Ok(histogram)
    }
}

impl Default for MutualInformation {
    fn default() -> Self {
        Self::new(32, 0.02)
    }
}

impl<B: Backend> Metric<B> for MutualInformation {
    fn evaluate(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Result<f64> {
        let samples = sample_overlap(fixed, moving, transform)?;
        let histogram = self.joint_histogram::<B>(&samples.fixed, &samples.moving, &fixed.data().device())?;
        Ok(histogram.mutual_information())
    }

    fn name(&self) -> &'static str {
        "MutualInformation"
    }
}

/// Binned mutual information reported as `-MI`, the value ANTs prints for
/// its Mattes metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MattesMutualInformation {
    num_bins: usize,
}

impl MattesMutualInformation {
    pub fn new(num_bins: usize) -> Self {
        Self { num_bins }
    }

    fn bin(value: f32, num_bins: usize) -> usize {
        ((value * num_bins as f32) as usize).min(num_bins - 1)
    }

    pub fn joint_histogram(&self, fixed: &[f32], moving: &[f32]) -> Result<JointHistogram> {
        if self.num_bins < 2 {
            return Err(RegistrationError::invalid_configuration("at least two bins are required"));
        }
        let mut histogram = JointHistogram::new(self.num_bins, self.num_bins);
        for (&f, &m) in normalise(fixed).iter().zip(normalise(moving).iter()) {
            histogram.add(Self::bin(f, self.num_bins), Self::bin(m, self.num_bins), 1.0);
        }
        Ok(histogram)
    }
}

impl Default for MattesMutualInformation {
    fn default() -> Self {
        Self::new(32)
    }
}

impl<B: Backend> Metric<B> for MattesMutualInformation {
    fn evaluate(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Result<f64> {
        let samples = sample_overlap(fixed, moving, transform)?;
        Ok(-self.joint_histogram(&samples.fixed, &samples.moving)?.mutual_information())
    }

    fn name(&self) -> &'static str {
        "MattesMutualInformation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn_ndarray::NdArray;
    use lesionkit_core::image::Frame;
    use lesionkit_core::spatial::{Direction, Point, Spacing};
    use lesionkit_core::transform::IdentityTransform;

    type B = NdArray<f32>;

    fn image(f: impl Fn(usize, usize, usize) -> f32) -> Image<B, 3> {
        let n = 8;
        let frame = Frame::lps([n, n, n], Point::origin(), Spacing::uniform(1.0), Direction::identity()).unwrap();
        let mut values = Vec::with_capacity(n * n * n);
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    values.push(f(x, y, z));
                }
            }
        }
        Image::from_values(values, &frame, &Default::default()).unwrap()
    }

    #[test]
    fn test_mutual_information_identical() {
        let a = image(|x, y, z| (x + 2 * y + 3 * z) as f32);
        let mi = MutualInformation::default().evaluate(&a, &a, &IdentityTransform).unwrap();
        assert!(mi.is_finite());
        assert!(mi > 1.0);
    }

    #[test]
    fn test_mutual_information_independent() {
        let a = image(|x, _, _| x as f32);
        let b = image(|_, y, _| y as f32 * 10.0);
        let independent = MutualInformation::default().evaluate(&a, &b, &IdentityTransform).unwrap();
        let identical = MutualInformation::default().evaluate(&a, &a, &IdentityTransform).unwrap();
        assert!(independent.abs() < 1e-3);
        assert!(identical > independent);
    }

    #[test]
    fn test_mattes_reports_negative_entropy_for_identical() {
        let a = image(|x, y, _| (x * 8 + y) as f32);
        let metric = MattesMutualInformation::default();
        let value = metric.evaluate(&a, &a, &IdentityTransform).unwrap();
        let samples = sample_overlap(&a, &a, &IdentityTransform).unwrap();
        let entropy = metric.joint_histogram(&samples.fixed, &samples.fixed).unwrap().entropy_fixed();
        assert!(value < 0.0);
        assert_relative_eq!(value, -entropy, epsilon = 1e-9);
    }

    #[test]
    fn test_mattes_independent_is_zero() {
        let a = image(|x, _, _| x as f32);
        let b = image(|_, _, z| z as f32);
        let value = MattesMutualInformation::default().evaluate(&a, &b, &IdentityTransform).unwrap();
        assert_relative_eq!(value, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_single_bin() {
        assert!(MattesMutualInformation::new(1).joint_histogram(&[0.0], &[0.0]).is_err());
    }
}
