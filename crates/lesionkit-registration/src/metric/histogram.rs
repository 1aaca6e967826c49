//! Joint intensity histogram shared by the mutual information metrics.

/// Row-major `fixed × moving` histogram of non-negative weights.
#[derive(Debug, Clone, PartialEq)]
pub struct JointHistogram {
    bins_fixed: usize,
    bins_moving: usize,
    counts: Vec<f64>,
}

fn entropy(probs: impl Iterator<Item = f64>) -> f64 {
    probs.filter(|&p| p > 0.0).map(|p| -p * p.ln()).sum()
}

impl JointHistogram {
    pub fn new(bins_fixed: usize, bins_moving: usize) -> Self {
        Self {
            bins_fixed,
            bins_moving,
            counts: vec![0.0; bins_fixed * bins_moving],
        }
    }

    pub fn add(&mut self, fixed_bin: usize, moving_bin: usize, weight: f64) {
        self.counts[fixed_bin * self.bins_moving + moving_bin] += weight;
    }

    /// Add a dense block laid out like the histogram itself.
    pub fn accumulate(&mut self, block: &[f32]) {
        for (c, &b) in self.counts.iter_mut().zip(block) {
            *c += b as f64;
        }
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    fn marginal_fixed(&self) -> Vec<f64> {
        self.counts
            .chunks(self.bins_moving)
            .map(|row| row.iter().sum())
            .collect()
    }

    fn marginal_moving(&self) -> Vec<f64> {
        let mut marginal = vec![0.0; self.bins_moving];
        for row in self.counts.chunks(self.bins_moving) {
            for (m, &c) in marginal.iter_mut().zip(row) {
                *m += c;
            }
        }
        marginal
    }

    /// Entropy of the fixed marginal, in nats.
    pub fn entropy_fixed(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        entropy(self.marginal_fixed().into_iter().map(|c| c / total))
    }

    /// Entropy of the moving marginal, in nats.
    pub fn entropy_moving(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        entropy(self.marginal_moving().into_iter().map(|c| c / total))
    }

    /// Joint entropy, in nats.
    pub fn entropy_joint(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            return 0.0;
        }
        entropy(self.counts.iter().map(|c| c / total))
    }

    /// MI = H(F) + H(M) - H(F, M)
    pub fn mutual_information(&self) -> f64 {
        debug_assert_eq!(self.counts.len(), self.bins_fixed * self.bins_moving);
        self.entropy_fixed() + self.entropy_moving() - self.entropy_joint()
    }
}

/// Map intensities linearly onto `[0, 1]`.
pub(crate) fn normalise(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&v| (v - min) / range).collect()
}
