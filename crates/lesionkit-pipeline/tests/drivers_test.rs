mod common;

use std::path::Path;

use approx::assert_relative_eq;
use burn::tensor::backend::Backend;
use common::*;
use lesionkit_core::image::{Image, LabelImage};
use lesionkit_core::spatial::Spacing;
use lesionkit_core::transform::{AffineTransform, DisplacementFieldTransform, InverseStrategy};
use lesionkit_pipeline::drivers::ensemble::{self, EnsembleMode};
use lesionkit_pipeline::drivers::evaluate::{evaluate_cohort, PredictionSource};
use lesionkit_pipeline::drivers::lesion_map::accumulate;
use lesionkit_pipeline::drivers::preprocess::{preprocess_cohort, NnUnetLayout};
use lesionkit_pipeline::drivers::registration::register_cohort;
use lesionkit_pipeline::drivers::stats::{stats_cohort, StatsFiles};
use lesionkit_pipeline::drivers::{lesion_atlas, similarity};
use lesionkit_pipeline::report::{read_csv, AtlasRow, EvaluationRow, MetadataRow, SimilarityRow};
use lesionkit_pipeline::{BatchOptions, IsolationPolicy, LabelSource, PipelineConfig};
use lesionkit_registration::{RegistrationEngine, RegistrationError, SynTransform};
use tempfile::tempdir;

fn options() -> BatchOptions {
    BatchOptions::default().with_progress(false)
}

/// Writes identity transforms instead of estimating them.
struct IdentityEngine;

impl RegistrationEngine for IdentityEngine {
    fn rigid<B: Backend>(
        &self,
        _fixed: &Image<B, 3>,
        _moving: &Image<B, 3>,
        output: &Path,
    ) -> lesionkit_registration::Result<()> {
        lesionkit_io::write_itk_affine(output, &AffineTransform::identity())
            .map_err(|e| RegistrationError::engine(format!("{e:#}")))
    }

    fn syn<B: Backend>(
        &self,
        fixed: &Image<B, 3>,
        _moving: &Image<B, 3>,
        output_affine: &Path,
        output_warp: &Path,
    ) -> lesionkit_registration::Result<()> {
        let field = DisplacementFieldTransform::<B>::zeros(fixed.frame(), &fixed.data().device());
        lesionkit_io::write_itk_affine(output_affine, &AffineTransform::identity())
            .and_then(|_| lesionkit_io::write_displacement_field(output_warp, &field))
            .map_err(|e| RegistrationError::engine(format!("{e:#}")))
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

fn template(root: &Path) -> (std::path::PathBuf, Image<TestBackend, 3>) {
    let image = Image::<TestBackend, 3>::from_values(flair_values(), &frame(), &Default::default()).unwrap();
    let path = root.join("template.nii.gz");
    lesionkit_io::write_nifti(&path, &image).unwrap();
    (path, image)
}

#[test]
fn test_register_writes_transform_layout() {
    let dir = tempdir().unwrap();
    let files = write_subject(dir.path(), "sub-001", true);
    std::fs::remove_file(&files.transforms.dwi_to_flair).unwrap();
    std::fs::remove_file(&files.transforms.flair_to_template_warp).unwrap();
    let (_, template) = template(dir.path());

    let summary = register_cohort::<TestBackend, _>(
        &[files.spec.clone()],
        &template,
        &IdentityEngine,
        options(),
        &Default::default(),
    )
    .unwrap();
    assert!(summary.is_complete());
    assert_eq!(summary.results[0], files.transforms);
    assert!(files.transforms.dwi_to_flair.is_file());
    SynTransform::<TestBackend>::read(&files.transforms, &Default::default()).unwrap();
}

#[test]
fn test_preprocess_writes_canonical_cases() {
    let dir = tempdir().unwrap();
    let specs = vec![
        write_subject(dir.path(), "sub-001", true).spec,
        write_subject(dir.path(), "sub-002", true).spec,
    ];
    let layout = NnUnetLayout::new(dir.path().join("nnunet"));
    let summary = preprocess_cohort::<TestBackend>(
        &specs,
        &layout,
        [16, 16, 16],
        Spacing::uniform(1.0),
        options(),
        &Default::default(),
    )
    .unwrap();
    assert_eq!(summary.succeeded(), 2);

    let flair = lesionkit_io::read_nifti::<TestBackend, _>(layout.flair("sub-002"), &Default::default()).unwrap();
    assert_eq!(flair.size(), [16, 16, 16]);
    assert_relative_eq!(flair.spacing()[0], 1.0, epsilon = 1e-6);
    let label = lesionkit_io::read_label::<TestBackend, _>(layout.label("sub-002"), &Default::default()).unwrap();
    assert!(label.count_nonzero() > 0);
    assert!(layout.dwi("sub-001").is_file());
}

#[test]
fn test_preprocess_keeps_going_past_failures() {
    let dir = tempdir().unwrap();
    let specs = vec![
        write_subject(dir.path(), "sub-001", true).spec,
        write_subject(dir.path(), "sub-002", false).spec,
    ];
    let layout = NnUnetLayout::new(dir.path().join("nnunet"));
    let summary = preprocess_cohort::<TestBackend>(
        &specs,
        &layout,
        [16, 16, 16],
        Spacing::uniform(1.0),
        options().with_fail_fast(false),
        &Default::default(),
    )
    .unwrap();
    assert_eq!(summary.results, vec!["sub-001".to_string()]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].subject, "sub-002");
    assert!(!summary.is_complete());

    let err = preprocess_cohort::<TestBackend>(
        &specs,
        &layout,
        [16, 16, 16],
        Spacing::uniform(1.0),
        options(),
        &Default::default(),
    );
    assert!(err.is_err());
}

#[test]
fn test_stats_reports() {
    let dir = tempdir().unwrap();
    let specs = vec![write_subject(dir.path(), "sub-001", true).spec];
    let files = StatsFiles::new(dir.path().join("stats"), "SYNTH");
    let summary = stats_cohort::<TestBackend>(
        &specs,
        &files,
        [16, 16, 16],
        Spacing::uniform(1.0),
        options(),
        &Default::default(),
    )
    .unwrap();

    let stats = &summary.results[0];
    assert_eq!(stats.components.len(), 1);
    assert_relative_eq!(stats.components[0].volume_ml, LESION_VOXELS as f64 * voxel_ml(), epsilon = 1e-9);
    assert_relative_eq!(stats.metadata.lesion_volume_ml, LESION_VOXELS as f64 * voxel_ml(), epsilon = 1e-9);
    assert_eq!(stats.metadata.shape_flair, "(12, 12, 10)");
    assert!(stats.metadata.dice_after_preprocessing > 0.8);
    assert_eq!(stats.metadata.flair_lesion_volume_ml, None);
    assert_eq!(stats.metadata.dwi_lesion_volume_ml, None);

    assert!(files.metadata.ends_with("SYNTH_metadata.csv"));
    assert!(files.metadata.is_file());
    assert!(files.components.is_file());
}

#[test]
fn test_stats_reports_each_annotation() {
    let dir = tempdir().unwrap();
    let files = write_subject(dir.path(), "sub-001", true);
    shift_dwi(&files.transforms, 2);
    let mut spec = files.spec;
    spec.label = write_dual_annotation(dir.path(), 2);
    spec.label_source = LabelSource::DualAnnotation;

    let files = StatsFiles::new(dir.path().join("stats"), "DUAL");
    let summary = stats_cohort::<TestBackend>(
        &[spec],
        &files,
        [16, 16, 16],
        Spacing::uniform(1.0),
        options(),
        &Default::default(),
    )
    .unwrap();

    let metadata = &summary.results[0].metadata;
    assert_relative_eq!(metadata.lesion_volume_ml, LESION_VOXELS as f64 * voxel_ml(), epsilon = 1e-9);
    assert_relative_eq!(metadata.flair_lesion_volume_ml.unwrap(), 18.0 * voxel_ml(), epsilon = 1e-9);
    assert_relative_eq!(metadata.dwi_lesion_volume_ml.unwrap(), 9.0 * voxel_ml(), epsilon = 1e-9);
    assert_eq!(summary.results[0].components.len(), 1);

    let rows: Vec<MetadataRow> = read_csv(&files.metadata).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].dwi_lesion_volume_ml, metadata.dwi_lesion_volume_ml);
}

#[test]
fn test_lesion_map_counts_subjects() {
    let dir = tempdir().unwrap();
    let specs = vec![
        write_subject(dir.path(), "sub-001", true).spec,
        write_subject(dir.path(), "sub-002", true).spec,
    ];
    let (_, template) = template(dir.path());
    let (map, summary) = accumulate::<TestBackend>(&specs, &template, options(), &Default::default()).unwrap();
    assert!(summary.is_complete());

    let values = map.values().unwrap();
    let max = values.iter().cloned().fold(f32::MIN, f32::max);
    assert_relative_eq!(max, 2.0);
    assert_relative_eq!(values.iter().sum::<f32>(), 2.0 * LESION_VOXELS as f32);
    assert_eq!(map.size(), SIZE);
}

#[test]
fn test_lesion_atlas_rows() {
    let dir = tempdir().unwrap();
    let specs = vec![write_subject(dir.path(), "sub-001", true).spec];
    let (template_path, _) = template(dir.path());

    // Lobe 1 below x index 6, lobe 2 from there on.
    let lobes: Vec<i64> = (0..SIZE.iter().product::<usize>())
        .map(|i| if i % SIZE[0] < 6 { 1 } else { 2 })
        .collect();
    let atlas = LabelImage::<TestBackend>::from_labels(lobes, &frame(), &Default::default()).unwrap();
    let atlas_path = dir.path().join("atlas.nii.gz");
    lesionkit_io::write_label(&atlas_path, &atlas).unwrap();

    let config = PipelineConfig::default()
        .with_template(template_path)
        .with_atlas(atlas_path)
        .with_output_folder(dir.path().join("out"));
    let summary = lesion_atlas::run::<TestBackend>(&config, &specs, &Default::default()).unwrap();
    assert!(summary.is_complete());

    let rows: Vec<AtlasRow> = read_csv(dir.path().join("out").join("stat_lobes_ISLES2022.csv")).unwrap();
    assert_eq!(rows.len(), 6);
    let volume = |lobe: i64, hemisphere: &str| {
        rows.iter()
            .find(|r| r.lobe == lobe && r.hemisphere == hemisphere)
            .map(|r| r.volume_ml)
            .unwrap()
    };
    // The world origin sits at x index 6 and the x axis points to the left.
    assert_relative_eq!(volume(1, "right"), 18.0 * voxel_ml(), epsilon = 1e-9);
    assert_relative_eq!(volume(2, "left"), 9.0 * voxel_ml(), epsilon = 1e-9);
    assert_relative_eq!(volume(0, "left") + volume(0, "right"), 0.0);
    let total: f64 = rows.iter().map(|r| r.volume_ml).sum();
    assert_relative_eq!(total, LESION_VOXELS as f64 * voxel_ml(), epsilon = 1e-9);
}

#[test]
fn test_similarity_in_process() {
    let dir = tempdir().unwrap();
    let specs = vec![write_subject(dir.path(), "sub-001", true).spec];
    let config = PipelineConfig::default()
        .with_isolation(IsolationPolicy::InProcess)
        .with_output_folder(dir.path().join("out"));
    let summary = similarity::run::<TestBackend>(&config, &specs, &Default::default()).unwrap();
    assert!(summary.is_complete());

    let rows: Vec<SimilarityRow> =
        read_csv(dir.path().join("out").join("registration_similarity_ISLES2022.csv")).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].kind, similarity::DWI_DWI);
    assert_eq!(rows[1].kind, similarity::DWI_FLAIR);
    for row in &rows {
        assert!(row.mutual_information > 0.0);
        assert!(row.similarity < 0.0);
    }
}

fn write_predictions(root: &Path, names: &[&str]) -> std::path::PathBuf {
    let folder = root.join("predictions");
    for name in names {
        let label = LabelImage::<TestBackend>::from_labels(lesion_values(true), &frame(), &Default::default()).unwrap();
        lesionkit_io::write_label(folder.join(format!("{name}.nii.gz")), &label).unwrap();
    }
    folder
}

#[test]
fn test_evaluate_perfect_prediction() {
    let dir = tempdir().unwrap();
    let specs = vec![write_subject(dir.path(), "sub-001", true).spec];
    let folder = write_predictions(dir.path(), &["sub-001"]);
    let output = dir.path().join("eval.csv");

    for source in [
        PredictionSource::native(&folder),
        PredictionSource::template(&folder, InverseStrategy::default()),
    ] {
        let summary = evaluate_cohort::<TestBackend>(&specs, &source, &output, options(), &Default::default()).unwrap();
        let row = &summary.results[0];
        assert_relative_eq!(row.dc, 1.0, epsilon = 1e-9);
        assert_relative_eq!(row.fp, 0.0);
        assert_relative_eq!(row.gt_volume, LESION_VOXELS as f64 * voxel_ml(), epsilon = 1e-9);
        assert_relative_eq!(row.pred_volume, row.gt_volume, epsilon = 1e-9);
    }
    let rows: Vec<EvaluationRow> = read_csv(&output).unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_evaluate_missing_prediction_fails() {
    let dir = tempdir().unwrap();
    let specs = vec![write_subject(dir.path(), "sub-001", true).spec];
    let folder = dir.path().join("empty");
    std::fs::create_dir_all(&folder).unwrap();
    let result = evaluate_cohort::<TestBackend>(
        &specs,
        &PredictionSource::native(&folder),
        &dir.path().join("eval.csv"),
        options(),
        &Default::default(),
    );
    assert!(result.is_err());
}

#[test]
fn test_ensemble_two_models() {
    let dir = tempdir().unwrap();
    let device = Default::default();
    let models = [dir.path().join("model_a"), dir.path().join("model_b")];
    let lesion = lesion_values(true);
    for (model, boost) in models.iter().zip([0.8f32, 0.3]) {
        let probabilities: Vec<f32> = lesion.iter().map(|&l| if l > 0 { boost } else { 0.1 }).collect();
        let map = Image::<TestBackend, 3>::from_values(probabilities, &frame(), &device).unwrap();
        lesionkit_io::write_nifti(model.join("case1_ProbMapClass1.nii.gz"), &map).unwrap();
    }
    std::fs::write(models[0].join("README.txt"), b"not a map").unwrap();

    let output = dir.path().join("ensemble");
    let summary =
        ensemble::run::<TestBackend>(EnsembleMode::DeepMedic, &output, &models, options(), &device).unwrap();
    assert_eq!(summary.results, vec![output.join("case1.nii.gz")]);

    let mask = lesionkit_io::read_label::<TestBackend, _>(output.join("case1.nii.gz"), &device).unwrap();
    assert_eq!(mask.values().unwrap(), lesion);
}
