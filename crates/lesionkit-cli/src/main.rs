use std::path::PathBuf;

use anyhow::{bail, Result};
use burn::tensor::backend::Backend;
use burn_ndarray::NdArray;
use clap::{Args, Parser, Subcommand, ValueEnum};
use lesionkit_core::transform::InverseStrategy;
use lesionkit_pipeline::drivers::ensemble::{self, EnsembleMode};
use lesionkit_pipeline::drivers::{evaluate, lesion_atlas, lesion_map, preprocess, registration, similarity, stats};
use lesionkit_pipeline::{worker, BatchSummary, IsolationPolicy, PipelineConfig};
use tracing::{error, info};

type Cpu = NdArray<f32>;

#[derive(Parser)]
#[command(name = "lesionkit")]
#[command(about = "Stroke lesion preprocessing, registration and cohort statistics")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings layered over the configuration file.
#[derive(Args, Debug)]
struct Overrides {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Cohort name, selects the catalog
    #[arg(long, global = true)]
    dataset: Option<String>,

    #[arg(long, global = true)]
    dataset_root: Option<PathBuf>,

    #[arg(long, global = true)]
    template: Option<PathBuf>,

    #[arg(long, global = true)]
    atlas: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output_folder: Option<PathBuf>,

    /// Canonical grid as `nx,ny,nz`
    #[arg(long, global = true, value_delimiter = ',')]
    target_shape: Option<Vec<usize>>,

    /// Canonical spacing in mm as `sx,sy,sz`
    #[arg(long, global = true, value_delimiter = ',')]
    target_spacing: Option<Vec<f64>>,

    /// Process subjects concurrently
    #[arg(long, global = true)]
    parallel: bool,

    /// Record failing subjects and keep going
    #[arg(long, global = true)]
    keep_going: bool,

    #[arg(long, global = true, value_enum)]
    isolation: Option<Isolation>,

    /// Directory holding antsRegistration
    #[arg(long, global = true)]
    ants_bin_dir: Option<PathBuf>,

    /// Invert template warps by fixed-point iteration instead of negation
    #[arg(long, global = true, value_name = "ITERATIONS")]
    fixed_point_inverse: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Isolation {
    Child,
    InProcess,
}

impl From<Isolation> for IsolationPolicy {
    fn from(isolation: Isolation) -> Self {
        match isolation {
            Isolation::Child => Self::ChildProcess,
            Isolation::InProcess => Self::InProcess,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate FLAIR → template and DWI → FLAIR transforms
    Register,

    /// Write canonical nnU-Net training cases
    Preprocess,

    /// Score predicted masks against the ground truth
    Evaluate {
        /// Folder with `{subject}.nii.gz` predictions
        input_folder: PathBuf,

        /// CSV report to write
        output_file: PathBuf,

        /// Predictions are in template space
        #[arg(long)]
        mni: bool,
    },

    /// Average model probabilities and threshold them
    Ensemble {
        /// nnUNet, deepmedic or 3DUNet
        mode: String,

        output_folder: PathBuf,

        /// One folder per model
        #[arg(required = true)]
        input_folders: Vec<PathBuf>,
    },

    /// Dataset metadata and lesion components
    Stats,

    /// Lesion frequency map in template space
    LesionMap,

    /// Lesion volume per lobe and hemisphere
    LesionAtlas,

    /// Mutual information between registered modalities
    Similarity,

    #[command(name = "worker", hide = true)]
    Worker { payload: String },
}

impl Overrides {
    fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        if let Some(name) = &self.dataset {
            config.dataset_name = name.clone();
        }
        if let Some(root) = &self.dataset_root {
            config = config.with_dataset_root(root);
        }
        if let Some(template) = &self.template {
            config = config.with_template(template);
        }
        if let Some(atlas) = &self.atlas {
            config = config.with_atlas(atlas);
        }
        if let Some(folder) = &self.output_folder {
            config = config.with_output_folder(folder);
        }
        if self.target_shape.is_some() || self.target_spacing.is_some() {
            let shape = match &self.target_shape {
                Some(values) => triple(values, "--target-shape")?,
                None => config.target_shape,
            };
            let spacing = match &self.target_spacing {
                Some(values) => triple(values, "--target-spacing")?,
                None => config.target_spacing,
            };
            config = config.with_target_grid(shape, spacing);
        }
        if self.parallel {
            config = config.with_parallel(true);
        }
        if self.keep_going {
            config = config.with_fail_fast(false);
        }
        if let Some(isolation) = self.isolation {
            config = config.with_isolation(isolation.into());
        }
        if let Some(dir) = &self.ants_bin_dir {
            config = config.with_ants_bin_dir(dir);
        }
        if let Some(iterations) = self.fixed_point_inverse {
            config = config.with_inverse_strategy(InverseStrategy::FixedPoint { iterations });
        }
        Ok(config)
    }

    fn load(&self) -> Result<PipelineConfig> {
        let config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };
        let config = self.apply(config)?;
        config.validate()?;
        Ok(config)
    }
}

fn triple<T: Copy>(values: &[T], flag: &str) -> Result<[T; 3]> {
    match values {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => bail!("{flag} takes three comma separated values, got {}", values.len()),
    }
}

/// Log every failed subject; fail the command unless all succeeded.
fn finish<T>(command: &str, summary: BatchSummary<T>) -> Result<()> {
    for failure in &summary.failures {
        error!(subject = %failure.subject, "{}", failure.error);
    }
    if !summary.is_complete() {
        bail!(
            "{command}: {} of {} subjects failed",
            summary.failures.len(),
            summary.failures.len() + summary.succeeded()
        );
    }
    info!("{command}: {} subjects done", summary.succeeded());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { overrides, command } = Cli::parse();
    let device = <Cpu as Backend>::Device::default();

    match command {
        // Worker replies go to stdout and must be the only thing printed there.
        Commands::Worker { payload } => println!("{}", worker::serve::<Cpu>(&payload, &device)),
        command => run(command, &overrides.load()?, &device)?,
    }
    Ok(())
}

fn run(command: Commands, config: &PipelineConfig, device: &<Cpu as Backend>::Device) -> Result<()> {
    info!(dataset = %config.dataset_name, root = %config.dataset_root.display(), "configuration loaded");

    match command {
        Commands::Register => {
            let specs = config.subjects()?;
            finish("register", registration::run::<Cpu>(config, &specs, device)?)
        }
        Commands::Preprocess => {
            let specs = config.subjects()?;
            finish("preprocess", preprocess::run::<Cpu>(config, &specs, device)?)
        }
        Commands::Evaluate {
            input_folder,
            output_file,
            mni,
        } => {
            let specs = config.subjects()?;
            let summary = evaluate::run::<Cpu>(config, &specs, &input_folder, &output_file, mni, device)?;
            finish("evaluate", summary)
        }
        Commands::Ensemble {
            mode,
            output_folder,
            input_folders,
        } => {
            let mode: EnsembleMode = mode.parse()?;
            let summary = ensemble::run::<Cpu>(mode, &output_folder, &input_folders, config.batch_options(), device)?;
            finish("ensemble", summary)
        }
        Commands::Stats => {
            let specs = config.subjects()?;
            finish("stats", stats::run::<Cpu>(config, &specs, device)?)
        }
        Commands::LesionMap => {
            let specs = config.subjects()?;
            finish("lesion-map", lesion_map::run::<Cpu>(config, &specs, device)?)
        }
        Commands::LesionAtlas => {
            let specs = config.subjects()?;
            finish("lesion-atlas", lesion_atlas::run::<Cpu>(config, &specs, device)?)
        }
        Commands::Similarity => {
            let specs = config.subjects()?;
            finish("similarity", similarity::run::<Cpu>(config, &specs, device)?)
        }
        Commands::Worker { .. } => bail!("worker tasks are only started by the pipeline itself"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_layer_over_defaults() {
        let cli = Cli::parse_from([
            "lesionkit",
            "--keep-going",
            "--isolation",
            "in-process",
            "--fixed-point-inverse",
            "20",
            "--target-shape",
            "160,192,160",
            "evaluate",
            "preds",
            "eval.csv",
            "--mni",
        ]);
        let config = cli.overrides.apply(PipelineConfig::default()).unwrap();
        assert!(!config.fail_fast);
        assert_eq!(config.target_shape, [160, 192, 160]);
        assert_eq!(config.target_spacing, [1.0, 1.0, 1.0]);
        assert_eq!(config.isolation, IsolationPolicy::InProcess);
        assert_eq!(config.inverse_strategy, InverseStrategy::FixedPoint { iterations: 20 });
        assert!(matches!(cli.command, Commands::Evaluate { mni: true, .. }));
    }

    #[test]
    fn test_rejects_short_target_grid() {
        let cli = Cli::parse_from(["lesionkit", "--target-spacing", "1,1", "stats"]);
        assert!(cli.overrides.apply(PipelineConfig::default()).is_err());
    }

    #[test]
    fn test_worker_is_hidden_subcommand() {
        let cli = Cli::parse_from(["lesionkit", worker::WORKER_SUBCOMMAND, "{}"]);
        assert!(matches!(cli.command, Commands::Worker { .. }));
    }
}
