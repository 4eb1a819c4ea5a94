//! Example: Train the appearance model of a patch library
//!
//! Reads every patch of every category folder, trains the principal-component
//! model and stores it as `library_model.bin` inside the library.
//!
//! # Directory Structure
//!
//! ```text
//! $CYTOLENS_LIBRARY_DIR/
//!   Lymphocyte/  *.tif
//!   Neutrophil/  *.tif
//! ```
//!
//! # Usage
//!
//! ```bash
//! CYTOLENS_LIBRARY_DIR=/path/to/library cargo run --example build_library
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use cytolens::LibraryFolder;

fn main() -> anyhow::Result<()> {
    common::log_setup::setup_logging("build_library", "info")?;

    let library_dir = env::var("CYTOLENS_LIBRARY_DIR")
        .map(PathBuf::from)
        .context("CYTOLENS_LIBRARY_DIR environment variable must be set")?;

    let library = LibraryFolder::new(&library_dir);
    let categories = library.categories()?;
    anyhow::ensure!(
        !categories.is_empty(),
        "no category folders in {}",
        library_dir.display()
    );
    tracing::info!("Categories: {}", categories.join(", "));

    let start = Instant::now();
    let model = library.compile()?;
    tracing::info!(
        "Trained on {} patches of dimension {} in {:.1?}",
        model.sample_count(),
        model.dimension(),
        start.elapsed()
    );
    tracing::info!("Model written to {}", library.model_path().display());
    Ok(())
}
