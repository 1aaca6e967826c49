//! CSV reports written by the analysis drivers.
//!
//! One row struct per report; column names are the serde names.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Raw geometry and lesion burden of one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub name: String,
    pub shape_flair: String,
    pub shape_dwi: String,
    pub voxel_dim_flair: String,
    pub voxel_dim_dwi: String,
    pub lesion_volume_ml: f64,
    /// Per-annotation volumes, each on its own grid. Only set for
    /// dual-annotation cohorts.
    pub flair_lesion_volume_ml: Option<f64>,
    pub dwi_lesion_volume_ml: Option<f64>,
    pub bet_mask_volume_ml: f64,
    /// Overlap between the raw label and the preprocessed label carried
    /// back to the raw grid.
    pub dice_after_preprocessing: f64,
}

/// One connected lesion component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRow {
    pub name: String,
    pub volume_ml: f64,
}

/// Lesion volume inside one lobe of one hemisphere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasRow {
    #[serde(rename = "Dataset")]
    pub dataset: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Hemisphere")]
    pub hemisphere: String,
    #[serde(rename = "Lobe")]
    pub lobe: i64,
    #[serde(rename = "Volume [ml]")]
    pub volume_ml: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRow {
    #[serde(rename = "Dataset")]
    pub dataset: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    /// `DWI-DWI` or `DWI-FLAIR`.
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Mutual Information")]
    pub mutual_information: f64,
    #[serde(rename = "Similarity")]
    pub similarity: f64,
}

/// Voxel scores of one prediction, in millilitres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub subject: String,
    pub tp: f64,
    pub fp: f64,
    pub tn: f64,
    #[serde(rename = "fn")]
    pub fn_: f64,
    pub dc: f64,
    pub pred_volume: f64,
    pub gt_volume: f64,
}

/// Write `rows` to `path` with a header line, creating parent folders.
pub fn write_csv<R: Serialize, P: AsRef<Path>>(path: P, rows: &[R]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "wrote report");
    Ok(())
}

/// Read back a report written by [`write_csv`].
pub fn read_csv<R: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> Result<Vec<R>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// `[a, b, c]` as the report prints shapes and spacings.
pub fn format_triple<T: std::fmt::Display>(values: &[T; 3]) -> String {
    format!("({}, {}, {})", values[0], values[1], values[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_atlas_header_uses_report_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("atlas.csv");
        let rows = vec![AtlasRow {
            dataset: "ISLES2022".into(),
            subject: "sub-strokecase0001".into(),
            hemisphere: "left".into(),
            lobe: 3,
            volume_ml: 1.5,
        }];
        write_csv(&path, &rows).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().next(),
            Some("Dataset,Subject,Hemisphere,Lobe,Volume [ml]")
        );
        let back: Vec<AtlasRow> = read_csv(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_evaluation_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("eval.csv");
        let row = EvaluationRow {
            subject: "s".into(),
            tp: 1.0,
            fp: 0.0,
            tn: 10.0,
            fn_: 0.5,
            dc: 0.8,
            pred_volume: 1.0,
            gt_volume: 1.5,
        };
        write_csv(&path, &[row]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("subject,tp,fp,tn,fn,dc,pred_volume,gt_volume\n"));
    }

    #[test]
    fn test_format_triple() {
        assert_eq!(format_triple(&[192usize, 192, 50]), "(192, 192, 50)");
        assert_eq!(format_triple(&[1.0, 0.5, 3.0]), "(1, 0.5, 3)");
    }
}
