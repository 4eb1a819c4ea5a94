//! Tests for the per-image orchestration and batch error policy.

use std::collections::BTreeMap;

use common::{Buffer2, CancelToken, SerdeFormat};

use super::*;
use crate::classifier::{IGNORE, Verdict};
use crate::image::Channel;
use crate::segmentation::{self, ThresholdMethod};
use crate::testing::{
    cell_scene, disk_and_ring_model, disk_and_ring_sets, init_tracing, save_scene,
    scene_segmentation,
};

const SIDE: usize = 31;

fn scene_config() -> PipelineConfig {
    PipelineConfig {
        depth: 3,
        segmentation: scene_segmentation(),
        classifier: classifier::Config {
            component_fraction: 100.0,
            confidence_threshold: 0.0,
            neighbours: 10,
            interactive: false,
        },
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Taxonomy and radius
// ============================================================================

#[test]
fn test_taxonomy_appends_other_and_edge() {
    assert_eq!(
        taxonomy(&strings(&["a", "b"])),
        strings(&["a", "b", "Other", "Edge"])
    );
    assert_eq!(
        taxonomy(&strings(&["a", "Other", "b"])),
        strings(&["a", "b", "Other", "Edge"])
    );
    assert_eq!(
        taxonomy(&strings(&["Edge", "a"])),
        strings(&["a", "Other", "Edge"])
    );
}

#[test]
fn test_patch_radius_from_dimension() {
    assert_eq!(patch_radius(961).unwrap(), 15);
    assert_eq!(patch_radius(121).unwrap(), 5);
    assert_eq!(patch_radius(1).unwrap(), 0);
    assert!(matches!(patch_radius(120), Err(Error::Configuration(_))));
    assert!(matches!(patch_radius(100), Err(Error::Configuration(_))));
}

#[test]
fn test_even_patch_model_is_rejected() {
    let mut sets = BTreeMap::new();
    sets.insert(
        "a".to_string(),
        vec![
            CellPatch::Cell(Buffer2::new(2, 2, vec![10, 200, 30, 40])),
            CellPatch::Cell(Buffer2::new(2, 2, vec![200, 10, 30, 40])),
        ],
    );
    let model = LibraryModel::train(&sets).unwrap();
    let err = Pipeline::new(&model, PipelineConfig::default()).err().unwrap();
    assert!(matches!(err, Error::Configuration(_)));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_defaults_are_valid() {
    let config = PipelineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.depth, 3);
    assert_eq!(config.segmentation.channel, Channel::Blue);
    assert_eq!(config.segmentation.min_size, 9000);
    assert_eq!(config.classifier.neighbours, 10);
}

#[test]
fn test_config_rejects_bad_depth() {
    let config = PipelineConfig {
        depth: 9,
        ..PipelineConfig::default()
    };
    assert!(matches!(config.validate(), Err(Error::Configuration(_))));
}

#[test]
fn test_config_loads_partial_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    std::fs::write(
        &path,
        "depth: 4\nclassifier:\n  neighbours: 5\nsegmentation:\n  method: Otsu\n  min_size: 300\n",
    )
    .unwrap();

    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config.depth, 4);
    assert_eq!(config.classifier.neighbours, 5);
    assert_eq!(config.classifier.confidence_threshold, 50.0);
    assert_eq!(config.segmentation.method, ThresholdMethod::Otsu);
    assert_eq!(config.segmentation.min_size, 300);
}

#[test]
fn test_config_load_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    std::fs::write(&path, r#"{"depth": 12}"#).unwrap();
    assert!(matches!(
        PipelineConfig::load(&path),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_config_round_trips_in_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let config = scene_config();
    for format in SerdeFormat::all_formats_for_testing() {
        let extension = match format {
            SerdeFormat::Yaml => "yaml",
            SerdeFormat::Json => "json",
            SerdeFormat::Toml => "toml",
            SerdeFormat::Bin => "bin",
        };
        let path = dir.path().join(format!("run.{extension}"));
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config, "{format:?}");
    }
}

// ============================================================================
// Single image
// ============================================================================

#[test]
fn test_run_image_aligns_results_with_centroids() {
    init_tracing();
    let model = disk_and_ring_model(SIDE);
    let pipeline = Pipeline::new(&model, scene_config()).unwrap();
    assert_eq!(pipeline.radius(), 15);
    assert_eq!(pipeline.categories(), strings(&["ring", "round", "Other", "Edge"]));

    let image = cell_scene(12.0);
    let centroids = Segmenter::from_config(scene_segmentation())
        .unwrap()
        .detect(&image);
    let results = pipeline.run_image(&image, None, &CancelToken::new()).unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results.len(), centroids.len());
    for (result, centroid) in results.iter().zip(&centroids) {
        assert_eq!(result.centroid, *centroid);
        assert!((0.0..=100.0).contains(&result.confidence));
        assert!(!result.verified);
    }

    let edges: Vec<_> = results.iter().filter(|r| r.category == EDGE).collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].confidence, 100.0);
    assert!(edges[0].centroid.row < 15);
    assert_eq!(
        results.iter().filter(|r| r.category == "round").count(),
        2
    );
}

#[test]
fn test_run_image_with_no_cells() {
    let model = disk_and_ring_model(SIDE);
    let pipeline = Pipeline::new(&model, scene_config()).unwrap();
    let image = CellImage::new_gray(60, 60, vec![180; 3600]);
    let results = pipeline.run_image(&image, None, &CancelToken::new()).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_verified_cells_are_archived() {
    let model = disk_and_ring_model(SIDE);
    let mut config = scene_config();
    config.classifier.confidence_threshold = 100.0;
    config.classifier.interactive = true;

    let library = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(&model, config)
        .unwrap()
        .with_archive(LibraryFolder::new(library.path()));

    let mut offered = Vec::new();
    let mut verifier = |_: &CellPatch, categories: &[String]| {
        offered = categories.to_vec();
        Verdict::Category("round".to_string())
    };
    let results = pipeline
        .run_image(&cell_scene(12.0), Some(&mut verifier), &CancelToken::new())
        .unwrap();

    let verified: Vec<_> = results.iter().filter(|r| r.verified).collect();
    assert_eq!(verified.len(), 2);
    assert!(verified.iter().all(|r| r.category == "round" && r.confidence == 100.0));
    assert_eq!(offered, strings(&["ring", "round", "Other", "Edge"]));

    let archived = common::file_utils::image_files(&library.path().join("round")).unwrap();
    assert_eq!(archived.len(), 2);
    let stored = crate::io::load_gray(&archived[0]).unwrap();
    assert_eq!((stored.rows(), stored.cols()), (SIDE, SIDE));
}

#[test]
fn test_untrained_verdicts_are_not_archived() {
    let model = disk_and_ring_model(SIDE);
    let mut config = scene_config();
    config.classifier.confidence_threshold = 100.0;
    config.classifier.interactive = true;

    let library = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(&model, config)
        .unwrap()
        .with_archive(LibraryFolder::new(library.path()));

    let mut answers = vec![Verdict::Ignore, Verdict::Category("Other".to_string())];
    let mut verifier = |_: &CellPatch, _: &[String]| answers.pop().unwrap_or(Verdict::Ignore);
    let results = pipeline
        .run_image(&cell_scene(12.0), Some(&mut verifier), &CancelToken::new())
        .unwrap();

    let categories: Vec<&str> = results
        .iter()
        .filter(|r| r.verified)
        .map(|r| r.category.as_str())
        .collect();
    assert_eq!(categories, vec!["Other", IGNORE]);
    assert!(common::file_utils::subdirectories(library.path())
        .unwrap()
        .is_empty());
}

// ============================================================================
// Batch
// ============================================================================

#[test]
fn test_batch_records_failures_and_continues() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    let c = dir.path().join("c.png");
    save_scene(&a, &cell_scene(12.0));
    std::fs::write(&b, b"not an image").unwrap();
    save_scene(&c, &cell_scene(12.5));

    // Training on a.png's own cells makes its queries exact duplicates.
    let config = scene_config();
    let scene = cell_scene(12.0);
    let mut sets = disk_and_ring_sets(SIDE);
    let own_cells = Segmenter::from_config(config.segmentation.clone())
        .unwrap()
        .detect(&scene)
        .into_iter()
        .map(|c| patch::extract(&scene, c, 15, Channel::Blue, config.depth))
        .filter(|p| !p.is_edge());
    sets.get_mut("round").unwrap().extend(own_cells);
    let model = LibraryModel::train(&sets).unwrap();

    let pipeline = Pipeline::new(&model, config).unwrap();
    let batch = pipeline
        .run_batch(&[a, b, c], None, &CancelToken::new())
        .unwrap();

    assert!(!batch.cancelled);
    assert_eq!(batch.failures.len(), 2);
    assert_eq!(batch.failures[0].name, "a.png");
    assert!(batch.failures[0].reason.contains("Zero distance"));
    assert_eq!(batch.failures[1].name, "b.png");

    assert_eq!(batch.images.len(), 1);
    assert_eq!(batch.images[0].name, "c.png");
    assert_eq!(batch.images[0].results.len(), 3);
    assert_eq!(batch.cell_count(), 3);
}

#[test]
fn test_cancelled_batch_stops_before_images() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    save_scene(&a, &cell_scene(12.0));

    let model = disk_and_ring_model(SIDE);
    let pipeline = Pipeline::new(&model, scene_config()).unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();

    let batch = pipeline.run_batch(&[a], None, &cancel).unwrap();
    assert!(batch.cancelled);
    assert!(batch.images.is_empty());
    assert!(batch.failures.is_empty());
}

#[test]
fn test_interactive_batch_without_verifier_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    save_scene(&a, &cell_scene(12.0));

    let model = disk_and_ring_model(SIDE);
    let mut config = scene_config();
    config.classifier.interactive = true;
    let pipeline = Pipeline::new(&model, config).unwrap();

    let err = pipeline
        .run_batch(&[a], None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_interactive_batch_without_verifier_fails_before_loading() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.png");
    std::fs::write(&broken, b"not an image").unwrap();

    let model = disk_and_ring_model(SIDE);
    let mut config = scene_config();
    config.classifier.interactive = true;
    let pipeline = Pipeline::new(&model, config).unwrap();

    // An unreadable image alone would otherwise be recorded as a failure.
    let err = pipeline
        .run_batch(&[broken], None, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_segmentation_config_reaches_segmenter() {
    let model = disk_and_ring_model(SIDE);
    let config = PipelineConfig {
        segmentation: segmentation::Config {
            min_size: 100_000,
            ..scene_segmentation()
        },
        ..scene_config()
    };
    let pipeline = Pipeline::new(&model, config).unwrap();
    let results = pipeline
        .run_image(&cell_scene(12.0), None, &CancelToken::new())
        .unwrap();
    assert!(results.is_empty());
}
