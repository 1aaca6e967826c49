//! `antsRegistration` driven through its command line.
//!
//! Inputs are written to a scratch directory, the tool runs as a child
//! process and the transforms it produces are moved to their final
//! location. Stage parameters are those of the ANTsPy `Rigid` and `SyN`
//! presets.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use burn::tensor::backend::Backend;
use lesionkit_core::image::Image;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::trait_::RegistrationEngine;
use crate::error::{RegistrationError, Result};

const EXECUTABLE: &str = "antsRegistration";
const OUTPUT_PREFIX: &str = "tx_";

/// Registration through the ANTs binaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AntsCliEngine {
    /// Directory holding `antsRegistration`; `PATH` lookup when unset.
    pub bin_dir: Option<PathBuf>,
    /// Fixed random seed for reproducible sampling.
    pub random_seed: Option<u32>,
    /// `ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS` for the child.
    pub threads: Option<usize>,
}

impl AntsCliEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    pub fn with_random_seed(mut self, seed: u32) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    fn executable(&self) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(EXECUTABLE),
            None => PathBuf::from(EXECUTABLE),
        }
    }

    fn run(&self, args: Vec<OsString>) -> Result<()> {
        let executable = self.executable();
        let mut command = Command::new(&executable);
        command.args(&args);
        if let Some(threads) = self.threads {
            command.env("ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS", threads.to_string());
        }
        debug!(command = ?command, "running registration");

        let output = command.output().map_err(|e| {
            RegistrationError::engine(format!("failed to start {}: {e}", executable.display()))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            return Err(RegistrationError::engine(format!(
                "{EXECUTABLE} exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join("\n")
            )));
        }
        Ok(())
    }

    fn common_args(&self, fixed: &Path, moving: &Path, prefix: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--dimensionality".into(),
            "3".into(),
            "--float".into(),
            "0".into(),
            "--output".into(),
            prefix.as_os_str().to_owned(),
            "--interpolation".into(),
            "Linear".into(),
            "--winsorize-image-intensities".into(),
            "[0.005,0.995]".into(),
            "--initial-moving-transform".into(),
            format!("[{},{},1]", fixed.display(), moving.display()).into(),
        ];
        if let Some(seed) = self.random_seed {
            args.push("--random-seed".into());
            args.push(seed.to_string().into());
        }
        args
    }
}

fn mattes(fixed: &Path, moving: &Path, sampling: &str) -> OsString {
    format!("Mattes[{},{},1,32,{sampling}]", fixed.display(), moving.display()).into()
}

fn push_stage(
    args: &mut Vec<OsString>,
    transform: &str,
    metric: OsString,
    convergence: &str,
    smoothing: &str,
    shrink: &str,
) {
    args.extend([
        "--transform".into(),
        transform.into(),
        "--metric".into(),
        metric,
        "--convergence".into(),
        convergence.into(),
        "--smoothing-sigmas".into(),
        smoothing.into(),
        "--shrink-factors".into(),
        shrink.into(),
    ]);
}

/// Move `from` to `to`, copying when they sit on different file systems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    if !from.is_file() {
        return Err(RegistrationError::engine(format!(
            "{EXECUTABLE} did not produce {}",
            from.display()
        )));
    }
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
    }
    Ok(())
}

fn write_input<B: Backend>(dir: &Path, name: &str, image: &Image<B, 3>) -> Result<PathBuf> {
    let path = dir.join(name);
    lesionkit_io::write_nifti(&path, image)
        .map_err(|e| RegistrationError::transform_io(format!("{}: {e:#}", path.display())))?;
    Ok(path)
}

impl RegistrationEngine for AntsCliEngine {
    fn rigid<B: Backend>(&self, fixed: &Image<B, 3>, moving: &Image<B, 3>, output: &Path) -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let fixed_path = write_input(scratch.path(), "fixed.nii.gz", fixed)?;
        let moving_path = write_input(scratch.path(), "moving.nii.gz", moving)?;
        let prefix = scratch.path().join(OUTPUT_PREFIX);

        let mut args = self.common_args(&fixed_path, &moving_path, &prefix);
        push_stage(
            &mut args,
            "Rigid[0.25]",
            mattes(&fixed_path, &moving_path, "Regular,0.2"),
            "[2100x1200x1200x0,1e-6,10]",
            "3x2x1x0vox",
            "4x4x2x1",
        );
        info!(output = %output.display(), "rigid registration");
        self.run(args)?;

        move_file(&scratch.path().join(format!("{OUTPUT_PREFIX}0GenericAffine.mat")), output)
    }

    fn syn<B: Backend>(
        &self,
        fixed: &Image<B, 3>,
        moving: &Image<B, 3>,
        output_affine: &Path,
        output_warp: &Path,
    ) -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let fixed_path = write_input(scratch.path(), "fixed.nii.gz", fixed)?;
        let moving_path = write_input(scratch.path(), "moving.nii.gz", moving)?;
        let prefix = scratch.path().join(OUTPUT_PREFIX);

        let mut args = self.common_args(&fixed_path, &moving_path, &prefix);
        push_stage(
            &mut args,
            "Affine[0.25]",
            mattes(&fixed_path, &moving_path, "Regular,0.2"),
            "[2100x1200x1200x0,1e-6,10]",
            "3x2x1x0vox",
            "4x2x2x1",
        );
        push_stage(
            &mut args,
            "SyN[0.2,3,0]",
            mattes(&fixed_path, &moving_path, "None,1"),
            "[40x20x0,1e-7,8]",
            "2x1x0vox",
            "4x2x1",
        );
        info!(affine = %output_affine.display(), warp = %output_warp.display(), "SyN registration");
        self.run(args)?;

        move_file(&scratch.path().join(format!("{OUTPUT_PREFIX}0GenericAffine.mat")), output_affine)?;
        move_file(&scratch.path().join(format!("{OUTPUT_PREFIX}1Warp.nii.gz")), output_warp)
    }

    fn name(&self) -> &'static str {
        "ants"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_executable_resolution() {
        assert_eq!(AntsCliEngine::new().executable(), PathBuf::from("antsRegistration"));
        let engine = AntsCliEngine::new().with_bin_dir("/opt/ants/bin");
        assert_eq!(engine.executable(), PathBuf::from("/opt/ants/bin/antsRegistration"));
    }

    #[test]
    fn test_common_args_carry_seed_and_initialisation() {
        let engine = AntsCliEngine::new().with_random_seed(7);
        let args = engine.common_args(Path::new("f.nii.gz"), Path::new("m.nii.gz"), Path::new("out_"));
        let args: Vec<String> = args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.windows(2).any(|w| w[0] == "--random-seed" && w[1] == "7"));
        assert!(args.contains(&"[f.nii.gz,m.nii.gz,1]".to_string()));
    }

    #[test]
    fn test_missing_binary_is_an_engine_error() {
        let engine = AntsCliEngine::new().with_bin_dir("/nonexistent/ants");
        let err = engine.run(vec!["--version".into()]).unwrap_err();
        assert!(matches!(err, RegistrationError::Engine(_)));
    }

    #[test]
    fn test_move_requires_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = move_file(&dir.path().join("absent.mat"), &dir.path().join("out.mat")).unwrap_err();
        assert!(matches!(err, RegistrationError::Engine(_)));
    }
}
