//! Overlap measures between binary masks.
//!
//! Every input is binarised (`!= 0`) before counting, so multi-class labels
//! are compared as lesion / background.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::image::LabelImage;
use crate::spatial::Spacing;

fn binary<B: Backend>(label: &LabelImage<B>) -> Tensor<B, 3, Int> {
    label.data().clone().not_equal_elem(0).int()
}

fn count<B: Backend>(t: Tensor<B, 3, Int>) -> usize {
    let n: i64 = t.sum().into_scalar().elem();
    n.max(0) as usize
}

fn complement<B: Backend>(t: Tensor<B, 3, Int>) -> Tensor<B, 3, Int> {
    t.neg().add_scalar(1)
}

fn check_shapes<B: Backend>(a: &LabelImage<B>, b: &LabelImage<B>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(CoreError::shape_mismatch(&a.shape(), &b.shape()));
    }
    Ok(())
}

/// Sørensen–Dice coefficient `2|A ∩ B| / (|A| + |B|)`.
///
/// Two empty masks agree perfectly (1.0).
pub fn dice_coefficient<B: Backend>(a: &LabelImage<B>, b: &LabelImage<B>) -> Result<f64> {
    check_shapes(a, b)?;
    let a = binary(a);
    let b = binary(b);
    let total = count(a.clone()) + count(b.clone());
    if total == 0 {
        return Ok(1.0);
    }
    let intersection = count(a * b);
    Ok(2.0 * intersection as f64 / total as f64)
}

/// `x ∧ ¬y` as a 0/1 label.
pub fn subtract_masks<B: Backend>(x: &LabelImage<B>, y: &LabelImage<B>) -> Result<LabelImage<B>> {
    check_shapes(x, y)?;
    Ok(x.with_data(binary(x) * complement(binary(y))))
}

/// Confusion counts of a binary prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatScores {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
    /// `tp + fn`
    pub support: usize,
}

impl StatScores {
    /// Dice from the counts, 1.0 when neither mask has a voxel.
    pub fn dice(&self) -> f64 {
        let denom = 2 * self.tp + self.fp + self.fn_;
        if denom == 0 {
            1.0
        } else {
            2.0 * self.tp as f64 / denom as f64
        }
    }

    /// Counts converted to millilitres for a voxel `spacing` in mm.
    pub fn to_volume_ml(&self, spacing: &Spacing<3>) -> [f64; 5] {
        let ml = |n: usize| super::voxel_count_to_volume_ml(n, spacing);
        [ml(self.tp), ml(self.fp), ml(self.tn), ml(self.fn_), ml(self.support)]
    }
}

/// Confusion counts of `pred` against `gt`, restricted to voxels where
/// `valid` is non-zero (usually the brain mask).
pub fn stat_scores<B: Backend>(
    pred: &LabelImage<B>,
    gt: &LabelImage<B>,
    valid: &LabelImage<B>,
) -> Result<StatScores> {
    check_shapes(pred, gt)?;
    check_shapes(pred, valid)?;
    let p = binary(pred);
    let g = binary(gt);
    let v = binary(valid);
    let not_p = complement(p.clone());
    let not_g = complement(g.clone());

    let tp = count(p.clone() * g.clone() * v.clone());
    let fp = count(p * not_g.clone() * v.clone());
    let fn_ = count(not_p.clone() * g * v.clone());
    let tn = count(not_p * not_g * v);

    Ok(StatScores {
        tp,
        fp,
        tn,
        fn_,
        support: tp + fn_,
    })
}
