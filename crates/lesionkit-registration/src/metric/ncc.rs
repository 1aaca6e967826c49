//! Normalized Cross Correlation (NCC) metric implementation.

use burn::tensor::backend::Backend;
use lesionkit_core::image::Image;
use lesionkit_core::transform::Transform;

use super::trait_::{sample_overlap, Metric};
use crate::error::{RegistrationError, Result};

/// Normalized Cross Correlation Metric.
///
/// NCC = sum((F - mean(F)) * (M - mean(M))) / sqrt(sum((F - mean(F))^2) * sum((M - mean(M))^2))
///
/// Range: [-1, 1], 1 for a perfect positive linear relation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedCrossCorrelation;

impl NormalizedCrossCorrelation {
    pub fn new() -> Self {
        Self
    }

    pub fn correlation(fixed: &[f32], moving: &[f32]) -> Result<f64> {
        let n = fixed.len().min(moving.len()) as f64;
        if n == 0.0 {
            return Err(RegistrationError::metric("no samples"));
        }
        let mean_f = fixed.iter().map(|&v| v as f64).sum::<f64>() / n;
        let mean_m = moving.iter().map(|&v| v as f64).sum::<f64>() / n;

        let (mut numerator, mut denom_f, mut denom_m) = (0.0, 0.0, 0.0);
        for (&f, &m) in fixed.iter().zip(moving) {
            let df = f as f64 - mean_f;
            let dm = m as f64 - mean_m;
            numerator += df * dm;
            denom_f += df * df;
            denom_m += dm * dm;
        }
        let denominator = (denom_f * denom_m).sqrt();
        if denominator <= f64::EPSILON {
            return Err(RegistrationError::metric("correlation of a constant image"));
        }
        Ok(numerator / denominator)
    }
}

impl<B: Backend> Metric<B> for NormalizedCrossCorrelation {
    fn evaluate(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        transform: &impl Transform<B, 3>,
    ) -> Result<f64> {
        let samples = sample_overlap(fixed, moving, transform)?;
        Self::correlation(&samples.fixed, &samples.moving)
    }

    fn name(&self) -> &'static str {
        "NormalizedCrossCorrelation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perfect_and_inverse_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [10.0, 20.0, 30.0, 40.0];
        let c = [-1.0, -2.0, -3.0, -4.0];
        assert_relative_eq!(NormalizedCrossCorrelation::correlation(&a, &b).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(NormalizedCrossCorrelation::correlation(&a, &c).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_is_an_error() {
        assert!(NormalizedCrossCorrelation::correlation(&[1.0, 1.0], &[1.0, 2.0]).is_err());
    }
}
