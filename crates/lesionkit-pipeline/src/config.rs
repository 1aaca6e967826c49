//! Pipeline configuration.
//!
//! Read from a JSON file and then overridden field by field from the
//! command line. Every field has a default, so a partial file is valid.

use std::path::{Path, PathBuf};

use anyhow::Context;
use lesionkit_core::spatial::Spacing;
use lesionkit_core::transform::InverseStrategy;
use lesionkit_registration::AntsCliEngine;
use serde::{Deserialize, Serialize};

use crate::batch::BatchOptions;
use crate::catalog::{self, SubjectSpec};
use crate::error::{PipelineError, Result};

/// Where per-subject registration and similarity units run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationPolicy {
    /// A short-lived child process per unit.
    #[default]
    ChildProcess,
    /// The calling process.
    InProcess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Name used in report rows and file names.
    pub dataset_name: String,
    pub dataset_root: PathBuf,
    /// Template volume defining the common space.
    pub template: PathBuf,
    /// Lobe parcellation in template space.
    pub atlas: PathBuf,
    pub output_folder: PathBuf,
    /// Canonical grid `[nx, ny, nz]`.
    pub target_shape: [usize; 3],
    /// Canonical spacing in millimetres.
    pub target_spacing: [f64; 3],
    pub inverse_strategy: InverseStrategy,
    pub isolation: IsolationPolicy,
    /// Process subjects concurrently.
    pub parallel: bool,
    /// Stop at the first failing subject.
    pub fail_fast: bool,
    /// Directory with the ANTs binaries; `PATH` when unset.
    pub ants_bin_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_name: "ISLES2022".to_string(),
            dataset_root: PathBuf::from("datasets/ISLES-2022"),
            template: PathBuf::from("datasets/template_flair_mni.nii.gz"),
            atlas: PathBuf::from("atlases/MNI-maxprob-thr0-1mm.nii.gz"),
            output_folder: PathBuf::from("results"),
            target_shape: [200, 200, 200],
            target_spacing: [1.0, 1.0, 1.0],
            inverse_strategy: InverseStrategy::default(),
            isolation: IsolationPolicy::default(),
            parallel: false,
            fail_fast: true,
            ants_bin_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_shape.iter().any(|&n| n == 0) {
            return Err(PipelineError::precondition(format!(
                "target shape {:?} has an empty axis",
                self.target_shape
            )));
        }
        Spacing::new(self.target_spacing).validate()?;
        if let InverseStrategy::FixedPoint { iterations: 0 } = self.inverse_strategy {
            return Err(PipelineError::precondition("fixed-point inversion needs at least one iteration"));
        }
        Ok(())
    }

    pub fn with_dataset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dataset_root = root.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_atlas(mut self, atlas: impl Into<PathBuf>) -> Self {
        self.atlas = atlas.into();
        self
    }

    pub fn with_output_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.output_folder = folder.into();
        self
    }

    pub fn with_target_grid(mut self, shape: [usize; 3], spacing: [f64; 3]) -> Self {
        self.target_shape = shape;
        self.target_spacing = spacing;
        self
    }

    pub fn with_inverse_strategy(mut self, strategy: InverseStrategy) -> Self {
        self.inverse_strategy = strategy;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationPolicy) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_ants_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ants_bin_dir = Some(dir.into());
        self
    }

    /// Registration engine configured from this file.
    pub fn engine(&self) -> AntsCliEngine {
        match &self.ants_bin_dir {
            Some(dir) => AntsCliEngine::new().with_bin_dir(dir),
            None => AntsCliEngine::new(),
        }
    }

    pub fn target_spacing(&self) -> Spacing<3> {
        Spacing::new(self.target_spacing)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions::default()
            .with_parallel(self.parallel)
            .with_fail_fast(self.fail_fast)
    }

    /// Cohort selected by `dataset_name`, rooted at `dataset_root`.
    pub fn subjects(&self) -> Result<Vec<SubjectSpec>> {
        catalog::for_dataset(&self.dataset_name, &self.dataset_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "target_shape": [160, 192, 160], "inverse_strategy": { "kind": "fixed_point", "iterations": 10 }, "isolation": "in_process" }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.target_shape, [160, 192, 160]);
        assert_eq!(config.target_spacing, [1.0, 1.0, 1.0]);
        assert_eq!(config.inverse_strategy, InverseStrategy::FixedPoint { iterations: 10 });
        assert_eq!(config.isolation, IsolationPolicy::InProcess);
        assert!(config.fail_fast);
    }

    #[test]
    fn test_builder_and_validation() {
        let config = PipelineConfig::new()
            .with_target_grid([100, 100, 100], [1.5, 1.5, 1.5])
            .with_fail_fast(false)
            .with_parallel(true);
        assert!(config.validate().is_ok());
        assert!(!config.fail_fast);

        let bad = PipelineConfig::new().with_target_grid([0, 10, 10], [1.0, 1.0, 1.0]);
        assert!(matches!(bad.validate(), Err(PipelineError::Precondition(_))));
        let bad = PipelineConfig::new().with_target_grid([10, 10, 10], [1.0, 0.0, 1.0]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_engine_uses_bin_dir() {
        let engine = PipelineConfig::new().with_ants_bin_dir("/opt/ants").engine();
        assert_eq!(engine.bin_dir, Some(PathBuf::from("/opt/ants")));
    }
}
