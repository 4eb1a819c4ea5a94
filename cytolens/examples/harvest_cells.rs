//! Example: Cut cells out of raw images to bootstrap a library
//!
//! Every in-bounds cell becomes `{image}_{cell}.tif` in the output folder.
//! Sort the patches into category subfolders of a library afterwards and run
//! the `build_library` example.
//!
//! # Usage
//!
//! ```bash
//! CYTOLENS_IMAGES_DIR=/path/to/images \
//! CYTOLENS_OUTPUT_DIR=/path/to/unsorted \
//! CYTOLENS_PATCH_RADIUS=50 \
//! CYTOLENS_CONFIG=run.yaml \
//!   cargo run --example harvest_cells
//! ```
//!
//! `CYTOLENS_PATCH_RADIUS` defaults to 50 and `CYTOLENS_CONFIG` (a pipeline
//! configuration in yaml, json or toml) to the built-in defaults.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use cytolens::{CancelToken, PatchConfig, PipelineConfig, Segmenter, harvest};

fn main() -> anyhow::Result<()> {
    common::log_setup::setup_logging("harvest_cells", "info")?;

    let images_dir = env::var("CYTOLENS_IMAGES_DIR")
        .map(PathBuf::from)
        .context("CYTOLENS_IMAGES_DIR environment variable must be set")?;
    let output_dir = env::var("CYTOLENS_OUTPUT_DIR")
        .map(PathBuf::from)
        .context("CYTOLENS_OUTPUT_DIR environment variable must be set")?;
    let radius = match env::var("CYTOLENS_PATCH_RADIUS") {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid CYTOLENS_PATCH_RADIUS '{value}'"))?,
        Err(_) => PatchConfig::default().radius,
    };
    let config = match env::var("CYTOLENS_CONFIG") {
        Ok(path) => PipelineConfig::load(path.as_ref())?,
        Err(_) => PipelineConfig::default(),
    };

    let patch_config = PatchConfig {
        radius,
        depth: config.depth,
        channel: config.segmentation.channel,
    };
    let segmenter = Segmenter::from_config(config.segmentation)?;

    let summary = harvest(
        &images_dir,
        &output_dir,
        &segmenter,
        &patch_config,
        &CancelToken::new(),
    )?;

    tracing::info!(
        "{} images, {} patches written, {} edge cells skipped",
        summary.images,
        summary.written,
        summary.edge_cells
    );
    for (path, reason) in &summary.failures {
        tracing::warn!("{}: {}", path.display(), reason);
    }
    Ok(())
}
