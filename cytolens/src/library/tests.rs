//! Tests for library training, persistence and the on-disk folder.

use std::collections::BTreeMap;

use common::{Buffer2, CancelToken};

use super::*;
use crate::error::Error;
use crate::patch::{self, CellPatch};
use crate::segmentation::{self, Segmenter};
use crate::testing::{Disk, disk_image, init_tracing};

fn patch2x2(values: [u8; 4]) -> CellPatch {
    CellPatch::Cell(Buffer2::new(2, 2, values.to_vec()))
}

fn patch3x3(seed: u8) -> CellPatch {
    CellPatch::Cell(Buffer2::from_fn(3, 3, |r, c| {
        ((r * 3 + c) as u8).wrapping_mul(seed).wrapping_add(seed) % 200 + 20
    }))
}

fn small_sets() -> BTreeMap<String, Vec<CellPatch>> {
    let mut sets = BTreeMap::new();
    sets.insert(
        "b_round".to_string(),
        vec![
            patch2x2([255, 10, 10, 255]),
            patch2x2([250, 20, 5, 240]),
            patch2x2([240, 30, 15, 255]),
        ],
    );
    sets.insert(
        "a_flat".to_string(),
        vec![
            patch2x2([10, 255, 255, 10]),
            patch2x2([20, 240, 255, 30]),
            patch2x2([5, 250, 235, 15]),
            CellPatch::Edge,
        ],
    );
    sets
}

fn column_variance(model: &LibraryModel, rows: &[Vec<f64>]) -> f64 {
    let d = model.dimension();
    let n = rows.len() as f64;
    (0..d)
        .map(|j| {
            let m = model.mean()[j];
            rows.iter().map(|r| (r[j] - m).powi(2)).sum::<f64>() / (n - 1.0)
        })
        .sum()
}

fn features_of(sets: &BTreeMap<String, Vec<CellPatch>>) -> Vec<Vec<f64>> {
    sets.values()
        .flatten()
        .filter_map(|p| p.features())
        .collect()
}

// ============================================================================
// Training
// ============================================================================

#[test]
fn test_train_skips_edges_and_orders_categories() {
    let model = LibraryModel::train(&small_sets()).unwrap();
    assert_eq!(model.sample_count(), 6);
    assert_eq!(model.dimension(), 4);
    assert_eq!(&model.labels()[..3], &["a_flat", "a_flat", "a_flat"]);
    assert_eq!(&model.labels()[3..], &["b_round", "b_round", "b_round"]);
    assert_eq!(model.categories(), vec!["a_flat", "b_round"]);
    assert!(model.validate().is_ok());
}

#[test]
fn test_covariance_basis_is_orthonormal_and_sorted() {
    let sets = small_sets();
    let model = LibraryModel::train(&sets).unwrap();
    assert_eq!(model.component_count(), 4);

    for (i, a) in model.components().iter().enumerate() {
        for (j, b) in model.components().iter().enumerate() {
            let expected = if i == j { 1.0 } else { 0.0 };
            assert!((dot(a, b) - expected).abs() < 1e-9, "components {i} {j}");
        }
    }
    for pair in model.variances().windows(2) {
        assert!(pair[0] >= pair[1]);
    }

    let total = column_variance(&model, &features_of(&sets));
    let explained: f64 = model.variances().iter().sum();
    assert!((total - explained).abs() < 1e-9);
}

#[test]
fn test_sample_space_basis_when_fewer_samples_than_pixels() {
    let mut sets = BTreeMap::new();
    sets.insert("one".to_string(), vec![patch3x3(3), patch3x3(7)]);
    sets.insert("two".to_string(), vec![patch3x3(11), patch3x3(13)]);
    let model = LibraryModel::train(&sets).unwrap();

    assert_eq!(model.dimension(), 9);
    assert!(model.component_count() <= 3);
    assert!(model.component_count() >= 1);

    let rows = features_of(&sets);
    let total = column_variance(&model, &rows);
    let explained: f64 = model.variances().iter().sum();
    assert!((total - explained).abs() < 1e-9);

    // Stored scores are projections of the training rows.
    for (row, scores) in rows.iter().zip(model.scores()) {
        let projected = model.project(row, model.component_count());
        for (a, b) in projected.iter().zip(scores) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}

#[test]
fn test_zero_variance_keeps_single_component() {
    let mut sets = BTreeMap::new();
    sets.insert(
        "same".to_string(),
        vec![patch2x2([1, 2, 3, 4]), patch2x2([1, 2, 3, 4])],
    );
    let model = LibraryModel::train(&sets).unwrap();
    assert_eq!(model.component_count(), 1);
    assert_eq!(model.variances(), &[0.0]);
    assert!(model.validate().is_ok());
}

#[test]
fn test_empty_library_is_rejected() {
    let mut sets = BTreeMap::new();
    assert!(matches!(LibraryModel::train(&sets), Err(Error::EmptyLibrary)));

    sets.insert("edges".to_string(), vec![CellPatch::Edge]);
    sets.insert("none".to_string(), vec![]);
    assert!(matches!(LibraryModel::train(&sets), Err(Error::EmptyLibrary)));
}

#[test]
fn test_mismatched_dimensions_are_configuration_errors() {
    let mut sets = BTreeMap::new();
    sets.insert("a".to_string(), vec![patch2x2([1, 2, 3, 4])]);
    sets.insert("b".to_string(), vec![patch3x3(5)]);
    assert!(matches!(
        LibraryModel::train(&sets),
        Err(Error::Configuration(_))
    ));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_model_round_trips_in_every_format() {
    let model = LibraryModel::train(&small_sets()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    for name in ["model.bin", "model.json", "model.yaml", "model.yml"] {
        let path = dir.path().join(name);
        model.save(&path).unwrap();
        let back = LibraryModel::load(&path).unwrap();
        assert_eq!(back.labels(), model.labels());
        assert_eq!(back.dimension(), model.dimension());
        for (a, b) in back.scores().iter().flatten().zip(model.scores().iter().flatten()) {
            assert!((a - b).abs() < 1e-12, "{name}");
        }
    }
}

#[test]
fn test_missing_model_is_library_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let result = LibraryModel::load(&dir.path().join("library_model.bin"));
    assert!(matches!(result, Err(Error::LibraryNotFound { .. })));
}

#[test]
fn test_malformed_model_is_library_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, r#"{"mean": [], "components": [], "variances": [], "scores": [], "labels": []}"#)
        .unwrap();
    let result = LibraryModel::load(&path);
    assert!(matches!(result, Err(Error::LibraryNotFound { .. })));

    std::fs::write(&path, b"not json").unwrap();
    assert!(matches!(
        LibraryModel::load(&path),
        Err(Error::LibraryNotFound { .. })
    ));
}

// ============================================================================
// Folder
// ============================================================================

fn write_category(root: &std::path::Path, category: &str, patches: &[CellPatch]) {
    let dir = root.join(category);
    std::fs::create_dir_all(&dir).unwrap();
    for (i, patch) in patches.iter().enumerate() {
        crate::io::save_gray(&dir.join(format!("{i}.tif")), patch.pixels().unwrap()).unwrap();
    }
}

#[test]
fn test_folder_compile_and_load() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let sets = small_sets();
    for (category, patches) in &sets {
        let usable: Vec<CellPatch> = patches.iter().filter(|p| !p.is_edge()).cloned().collect();
        write_category(dir.path(), category, &usable);
    }
    std::fs::write(dir.path().join("a_flat").join("notes.txt"), b"ignored").unwrap();

    let folder = LibraryFolder::new(dir.path());
    assert_eq!(folder.categories().unwrap(), vec!["a_flat", "b_round"]);

    let model = folder.compile().unwrap();
    assert!(folder.model_path().ends_with(MODEL_FILE_NAME));
    let loaded = folder.load_model().unwrap();
    assert_eq!(loaded.labels(), model.labels());
    assert_eq!(loaded.sample_count(), 6);
}

#[test]
fn test_folder_without_model_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let folder = LibraryFolder::new(dir.path());
    assert!(matches!(
        folder.load_model(),
        Err(Error::LibraryNotFound { .. })
    ));
}

#[test]
fn test_archive_verified_writes_into_category() {
    let dir = tempfile::tempdir().unwrap();
    let folder = LibraryFolder::new(dir.path());
    let patch = patch2x2([0, 64, 128, 255]);

    let first = folder.archive_verified("Neutrophil", &patch).unwrap();
    let second = folder.archive_verified("Neutrophil", &patch).unwrap();
    assert_ne!(first, second);
    assert!(first.starts_with(dir.path().join("Neutrophil")));
    assert_eq!(crate::io::load_gray(&first).unwrap(), *patch.pixels().unwrap());

    assert!(folder.archive_verified("Neutrophil", &CellPatch::Edge).is_err());
}

// ============================================================================
// Harvest
// ============================================================================

#[test]
fn test_harvest_writes_in_bounds_cells() {
    let images = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let image = disk_image(
        60,
        110,
        &[Disk::new(30.0, 30.0, 15.0), Disk::new(30.0, 80.0, 15.0)],
        200,
        50,
    );
    let plane = image.plane(crate::image::Channel::Blue);
    crate::io::save_gray(&images.path().join("slide.png"), &plane).unwrap();
    std::fs::write(images.path().join("broken.png"), b"garbage").unwrap();

    let segmenter = Segmenter::from_config(segmentation::Config {
        min_size: 300,
        ..segmentation::Config::default()
    })
    .unwrap();
    let patch_config = patch::Config {
        radius: 10,
        ..patch::Config::default()
    };

    let summary = harvest(
        images.path(),
        output.path(),
        &segmenter,
        &patch_config,
        &CancelToken::new(),
    )
    .unwrap();

    assert_eq!(summary.images, 1);
    assert_eq!(summary.written, 2);
    assert_eq!(summary.failures.len(), 1);
    assert!(output.path().join("slide_1.tif").exists());
    assert!(output.path().join("slide_2.tif").exists());
}

#[test]
fn test_harvest_stops_when_cancelled() {
    let images = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let plane = Buffer2::new_filled(20, 20, 100u8);
    crate::io::save_gray(&images.path().join("a.png"), &plane).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let summary = harvest(
        images.path(),
        output.path(),
        &Segmenter::default(),
        &patch::Config::default(),
        &cancel,
    )
    .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.images, 0);
}
