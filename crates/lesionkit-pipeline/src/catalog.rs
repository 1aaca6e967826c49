//! Cohort catalogs.
//!
//! A catalog turns a dataset root into subject descriptions with the
//! cohort's path conventions and annotation format baked in.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Image the lesion label was drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Flair,
    Dwi,
}

/// How a cohort stores its lesion annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LabelSource {
    /// One segmentation NRRD with a FLAIR and a DWI segment.
    DualAnnotation,
    /// A label volume drawn on one modality.
    Volume { modality: Modality },
}

/// Everything needed to construct a subject. Plain data, cheap to send to
/// worker processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSpec {
    pub name: String,
    pub flair: PathBuf,
    pub dwi: PathBuf,
    pub label: PathBuf,
    pub bet_mask: Option<PathBuf>,
    pub label_source: LabelSource,
    /// Cohort ground truth says there is no lesion.
    pub allow_empty_label: bool,
}

/// ISLES-2022 subjects confirmed to contain no lesion.
pub const ISLES2022_TRUE_NEGATIVES: [&str; 8] = [
    "sub-strokecase0006",
    "sub-strokecase0016",
    "sub-strokecase0020",
    "sub-strokecase0032",
    "sub-strokecase0037",
    "sub-strokecase0150",
    "sub-strokecase0151",
    "sub-strokecase0170",
];

const ISLES2022_CASES: usize = 250;

pub fn is_isles2022_true_negative(name: &str) -> bool {
    ISLES2022_TRUE_NEGATIVES.iter().any(|id| name.contains(id))
}

fn isles2022_subject(root: &Path, id: &str) -> SubjectSpec {
    let session = "ses-0001";
    SubjectSpec {
        name: id.to_string(),
        flair: root
            .join(id)
            .join(session)
            .join("anat")
            .join(format!("{id}_{session}_FLAIR.nii.gz")),
        dwi: root
            .join(id)
            .join(session)
            .join("dwi")
            .join(format!("{id}_{session}_dwi.nii.gz")),
        label: root
            .join("derivatives")
            .join(id)
            .join(session)
            .join(format!("{id}_{session}_msk.nii.gz")),
        bet_mask: None,
        label_source: LabelSource::Volume { modality: Modality::Dwi },
        allow_empty_label: is_isles2022_true_negative(id),
    }
}

/// All ISLES-2022 training cases under `root`.
pub fn isles2022<P: AsRef<Path>>(root: P) -> Vec<SubjectSpec> {
    let root = root.as_ref();
    (1..=ISLES2022_CASES)
        .map(|i| isles2022_subject(root, &format!("sub-strokecase{i:04}")))
        .collect()
}

/// Catalog of a cohort by name.
pub fn for_dataset<P: AsRef<Path>>(name: &str, root: P) -> Result<Vec<SubjectSpec>> {
    match name.to_ascii_uppercase().replace('-', "").as_str() {
        "ISLES2022" => Ok(isles2022(root)),
        _ => Err(PipelineError::cohort_data(format!("unknown dataset '{name}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isles2022_paths() {
        let subjects = isles2022("/data/ISLES-2022");
        assert_eq!(subjects.len(), 250);
        let first = &subjects[0];
        assert_eq!(first.name, "sub-strokecase0001");
        assert_eq!(
            first.flair,
            PathBuf::from("/data/ISLES-2022/sub-strokecase0001/ses-0001/anat/sub-strokecase0001_ses-0001_FLAIR.nii.gz")
        );
        assert_eq!(
            first.dwi,
            PathBuf::from("/data/ISLES-2022/sub-strokecase0001/ses-0001/dwi/sub-strokecase0001_ses-0001_dwi.nii.gz")
        );
        assert_eq!(
            first.label,
            PathBuf::from("/data/ISLES-2022/derivatives/sub-strokecase0001/ses-0001/sub-strokecase0001_ses-0001_msk.nii.gz")
        );
        assert_eq!(first.label_source, LabelSource::Volume { modality: Modality::Dwi });
        assert_eq!(subjects[249].name, "sub-strokecase0250");
    }

    #[test]
    fn test_true_negative_allow_list() {
        let subjects = isles2022("root");
        let allowed: Vec<&str> = subjects
            .iter()
            .filter(|s| s.allow_empty_label)
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(allowed, ISLES2022_TRUE_NEGATIVES.to_vec());
        assert!(is_isles2022_true_negative("prefix-sub-strokecase0150-suffix"));
        assert!(!is_isles2022_true_negative("sub-strokecase0001"));
    }

    #[test]
    fn test_dataset_by_name() {
        assert_eq!(for_dataset("ISLES-2022", "root").unwrap().len(), 250);
        assert!(matches!(for_dataset("ATLAS", "root"), Err(PipelineError::CohortData(_))));
    }

    #[test]
    fn test_spec_serialises_label_source() {
        let json = serde_json::to_string(&LabelSource::Volume { modality: Modality::Dwi }).unwrap();
        assert_eq!(json, r#"{"kind":"volume","modality":"dwi"}"#);
    }
}
